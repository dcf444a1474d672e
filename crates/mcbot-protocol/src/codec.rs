//! The wire codec: bytes ⇄ packets for one connection.
//!
//! Layering, outermost first:
//!
//! ```text
//! socket bytes
//!   └─ AES-128-CFB8          (after the encryption handshake)
//!       └─ VarInt length + frame
//!           └─ zlib wrapper  (after SetCompression)
//!               └─ VarInt packet id + body
//! ```
//!
//! Decoding is resumable. [`WireCodec::feed`] appends whatever the socket
//! produced (decrypting it on the way in) and [`WireCodec::decode`]
//! returns [`Decoded::NeedMoreData`] until a whole frame is buffered. An
//! incomplete frame consumes nothing, so any split of the byte stream
//! decodes to the same packets.
//!
//! The codec holds per-connection state (buffer, cipher, threshold) and is
//! owned by exactly one session task. The [`PacketTable`] is shared.

use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::cipher::{DecryptStream, EncryptStream};
use crate::compression::{compress_body, decompress_body};
use crate::varint::{peek_varint, read_varint, write_varint};
use crate::{Packet, PacketTable, ProtocolError, ProtocolState};

/// Largest length a 3-byte VarInt can carry.
pub const MAX_FRAME_LEN: usize = 2_097_151;

/// Frame length prefixes are at most this many bytes.
const FRAME_LEN_MAX_BYTES: usize = 3;

/// Result of a decode attempt.
#[derive(Debug, PartialEq)]
pub enum Decoded<T> {
    /// A complete packet.
    Ready(T),
    /// The buffer holds only part of the next frame.
    NeedMoreData,
}

/// Per-connection codec state.
#[derive(Debug)]
pub struct WireCodec {
    table: Arc<PacketTable>,
    read_buf: BytesMut,
    compression: Option<usize>,
    max_frame_len: usize,
    decrypt: Option<DecryptStream>,
    encrypt: Option<EncryptStream>,
}

impl WireCodec {
    /// Creates a codec with no compression and no encryption.
    pub fn new(table: Arc<PacketTable>) -> Self {
        Self {
            table,
            read_buf: BytesMut::with_capacity(4096),
            compression: None,
            max_frame_len: MAX_FRAME_LEN,
            decrypt: None,
            encrypt: None,
        }
    }

    /// Lowers the frame-size ceiling (it can never exceed [`MAX_FRAME_LEN`]).
    pub fn with_max_frame_len(mut self, max: usize) -> Self {
        self.max_frame_len = max.min(MAX_FRAME_LEN);
        self
    }

    /// The shared packet table.
    pub fn table(&self) -> &Arc<PacketTable> {
        &self.table
    }

    // -----------------------------------------------------------------------
    // Connection state
    // -----------------------------------------------------------------------

    /// Applies a `SetCompression` threshold. Negative disables compression.
    pub fn set_compression(&mut self, threshold: i32) {
        self.compression = usize::try_from(threshold).ok();
    }

    /// The active compression threshold, if any.
    pub fn compression(&self) -> Option<usize> {
        self.compression
    }

    /// Enables encryption in both directions.
    ///
    /// Takes effect from the next byte fed or encoded. Bytes already in the
    /// read buffer were received in the clear and stay as they are.
    pub fn install_cipher(&mut self, shared_secret: &[u8]) -> Result<(), ProtocolError> {
        self.install_read_cipher(shared_secret)?;
        self.install_write_cipher(shared_secret)
    }

    /// Enables decryption of incoming bytes only.
    pub fn install_read_cipher(&mut self, shared_secret: &[u8]) -> Result<(), ProtocolError> {
        self.decrypt = Some(DecryptStream::new(shared_secret)?);
        Ok(())
    }

    /// Enables encryption of outgoing bytes only.
    pub fn install_write_cipher(&mut self, shared_secret: &[u8]) -> Result<(), ProtocolError> {
        self.encrypt = Some(EncryptStream::new(shared_secret)?);
        Ok(())
    }

    /// Returns `true` once either direction is encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.decrypt.is_some() || self.encrypt.is_some()
    }

    // -----------------------------------------------------------------------
    // Decoding
    // -----------------------------------------------------------------------

    /// Appends bytes received from the socket.
    pub fn feed(&mut self, data: &[u8]) {
        let start = self.read_buf.len();
        self.read_buf.extend_from_slice(data);
        if let Some(decrypt) = &mut self.decrypt {
            decrypt.apply(&mut self.read_buf[start..]);
        }
    }

    /// Number of buffered (decrypted) bytes not yet consumed.
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    /// Splits the next complete frame off the buffer.
    ///
    /// Returns the frame body still in its compressed format; pass it to
    /// [`WireCodec::unpack`] and then [`WireCodec::decode_body`]. Splitting
    /// the steps lets the caller inflate large frames off the async loop.
    ///
    /// # Errors
    /// A length prefix longer than 3 bytes, a zero length, or a length
    /// above the configured ceiling. The stream is unusable afterwards.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, ProtocolError> {
        let Some((len, prefix)) = peek_varint(&self.read_buf, FRAME_LEN_MAX_BYTES)? else {
            return Ok(None);
        };
        let len = usize::try_from(len)
            .map_err(|_| ProtocolError::InvalidMessage(format!("negative frame length {len}")))?;
        if len == 0 {
            return Err(ProtocolError::InvalidMessage("empty frame".into()));
        }
        if len > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                len,
                max: self.max_frame_len,
            });
        }
        if self.read_buf.len() < prefix + len {
            return Ok(None);
        }
        self.read_buf.advance(prefix);
        Ok(Some(self.read_buf.split_to(len).freeze()))
    }

    /// Removes the compression wrapper from a frame, if compression is on.
    ///
    /// Free of `self` so it can run on a blocking worker.
    pub fn unpack(frame: Bytes, compression: Option<usize>) -> Result<Bytes, ProtocolError> {
        match compression {
            Some(threshold) => decompress_body(frame, threshold),
            None => Ok(frame),
        }
    }

    /// Parses `id + body` for `state`.
    ///
    /// # Errors
    /// [`ProtocolError::UnknownPacketId`] when the table has no entry,
    /// otherwise any schema error, including unread trailing bytes.
    pub fn decode_body<P: Packet>(&self, state: ProtocolState, mut body: Bytes) -> Result<P, ProtocolError> {
        let id = read_varint(&mut body)?;
        let kind = self
            .table
            .kind_for(state, P::DIRECTION, id)
            .ok_or(ProtocolError::UnknownPacketId { state, id })?;
        let packet = P::read_body(kind, &mut body)?;
        if body.has_remaining() {
            return Err(ProtocolError::InvalidMessage(format!(
                "{} trailing bytes after {kind:?}",
                body.remaining()
            )));
        }
        Ok(packet)
    }

    /// Decodes the next packet for `state`.
    ///
    /// The whole frame is consumed before the body is parsed, so after an
    /// [`ProtocolError::UnknownPacketId`] the caller can keep decoding.
    pub fn decode<P: Packet>(&mut self, state: ProtocolState) -> Result<Decoded<P>, ProtocolError> {
        let Some(frame) = self.next_frame()? else {
            return Ok(Decoded::NeedMoreData);
        };
        let body = Self::unpack(frame, self.compression)?;
        self.decode_body(state, body).map(Decoded::Ready)
    }

    // -----------------------------------------------------------------------
    // Encoding
    // -----------------------------------------------------------------------

    /// Encodes `packet` into ready-to-write socket bytes.
    ///
    /// # Errors
    /// [`ProtocolError::UnregisteredPacket`] if the table has no id for it
    /// in `state`, or [`ProtocolError::FrameTooLarge`].
    pub fn encode<P: Packet>(&mut self, state: ProtocolState, packet: &P) -> Result<Bytes, ProtocolError> {
        let kind = packet.kind();
        let id = self
            .table
            .id_for(state, P::DIRECTION, kind)
            .ok_or(ProtocolError::UnregisteredPacket { state, kind })?;

        let mut body = BytesMut::new();
        write_varint(&mut body, id);
        packet.write_body(&mut body);

        let payload = match self.compression {
            Some(threshold) => compress_body(&body, threshold)?,
            None => body,
        };
        if payload.len() > self.max_frame_len {
            return Err(ProtocolError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_len,
            });
        }

        let mut out = BytesMut::with_capacity(payload.len() + FRAME_LEN_MAX_BYTES);
        write_varint(&mut out, payload.len() as i32);
        out.put_slice(&payload);
        if let Some(encrypt) = &mut self.encrypt {
            encrypt.apply(&mut out);
        }
        Ok(out.freeze())
    }
}
