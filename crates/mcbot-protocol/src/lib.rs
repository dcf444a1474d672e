//! Wire protocol for mcbot.
//!
//! This crate is the "language" sessions speak with a Minecraft (Java
//! edition) server:
//!
//! - **Primitives** ([`varint`], [`buf`]): VarInt/VarLong, strings, UUIDs.
//! - **Schemas** ([`Clientbound`], [`Serverbound`], [`PacketKind`]): the
//!   packet bodies the bot understands.
//! - **Tables** ([`PacketTable`]): per-version id mappings, shared as data.
//! - **Codec** ([`WireCodec`]): framing, zlib compression and
//!   AES-128-CFB8 encryption, with resumable decoding.
//! - **Text** ([`Text`]): chat components in JSON and NBT form.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (connection lifecycle). It never touches a socket: it turns bytes into
//! packets and packets into bytes, and reports malformed input as a
//! [`ProtocolError`].
//!
//! ```text
//! Transport (bytes) → Protocol (packets) → Session (state machine)
//! ```

mod cipher;
mod codec;
mod compression;
mod error;
mod nbt;
mod packet;
mod status;
mod table;
mod text;
mod types;

pub mod buf;
pub mod varint;

pub use cipher::{DecryptStream, EncryptStream, SHARED_SECRET_LEN};
pub use codec::{Decoded, MAX_FRAME_LEN, WireCodec};
pub use compression::MAX_DECOMPRESSED_LEN;
pub use error::ProtocolError;
pub use packet::{
    ClientInformation, ClientStatusAction, Clientbound, KnownPack, Packet, PacketKind,
    ProfileProperty, ResourcePackResult, Serverbound, teleport_flags,
};
pub use status::{ServerStatus, StatusPlayers, StatusVersion};
pub use table::{PacketTable, PacketTableBuilder};
pub use text::{Text, strip_legacy_codes};
pub use types::{Direction, NextState, PROTOCOL_VERSION_1_21, ProtocolState};
