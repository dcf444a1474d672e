//! Error types for the protocol layer.
//!
//! Every failure to turn bytes into packets (or packets into bytes) ends up
//! here. A `ProtocolError` always means the byte stream itself is wrong or
//! unsupported, never that the network failed: that is a
//! `TransportError` one layer down.

use crate::{PacketKind, ProtocolState};

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A VarInt or VarLong kept its continuation bit set past the allowed
    /// number of bytes.
    #[error("VarInt too long: more than {max_bytes} bytes")]
    VarIntTooLong { max_bytes: usize },

    /// A field claimed more bytes than the packet body holds.
    #[error("buffer too short: need {needed} bytes, have {remaining}")]
    BufferTooShort { needed: usize, remaining: usize },

    /// The declared frame length exceeds the configured ceiling.
    #[error("frame of {len} bytes exceeds maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },

    /// No schema is registered for this id in the current state.
    ///
    /// The frame has already been consumed when this is returned, so the
    /// caller may choose to skip it and keep reading.
    #[error("unknown packet id 0x{id:02X} in state {state}")]
    UnknownPacketId { state: ProtocolState, id: i32 },

    /// Tried to send a packet the active table has no id for.
    #[error("packet {kind:?} is not registered for state {state}")]
    UnregisteredPacket { state: ProtocolState, kind: PacketKind },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,

    /// A string field exceeded its protocol limit (in characters).
    #[error("string of {len} characters exceeds limit of {max}")]
    StringTooLong { len: usize, max: usize },

    /// zlib failed to inflate or deflate a body.
    #[error("compression error: {0}")]
    Compression(#[source] std::io::Error),

    /// A compressed body declared an uncompressed length it did not have.
    #[error("decompressed length mismatch: declared {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    /// A compressed body declared an uncompressed length above the hard cap.
    #[error("declared uncompressed length {declared} exceeds maximum of {max}")]
    DecompressedTooLarge { declared: usize, max: usize },

    /// A body was compressed even though it is smaller than the threshold.
    #[error("badly compressed packet: {declared} bytes is below threshold {threshold}")]
    BelowThreshold { declared: usize, threshold: usize },

    /// The shared secret is not a valid AES-128 key.
    #[error("invalid cipher key length {0}, expected 16")]
    InvalidKeyLength(usize),

    /// A JSON text component or status document failed to parse.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A network NBT value failed to parse.
    #[error("invalid NBT: {0}")]
    Nbt(String),

    /// The message is structurally valid but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
