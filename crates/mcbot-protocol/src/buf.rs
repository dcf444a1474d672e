//! Field-level readers and writers shared by every packet schema.
//!
//! Readers check `remaining()` before touching the buffer: `bytes::Buf`
//! panics on underflow, and a malicious length prefix must turn into a
//! [`ProtocolError`], not a crash.

use bytes::{Buf, BufMut, Bytes};
use uuid::Uuid;

use crate::varint::{read_varint, write_varint};
use crate::ProtocolError;

/// Default limit for strings without a tighter protocol bound.
pub const MAX_STRING_CHARS: usize = 32767;

/// Decode and encode a value onto a buffer.
///
/// Implemented by the small structs nested inside packets (client
/// information, known packs, profile properties).
pub trait Wire: Sized {
    fn write_to(&self, buf: &mut impl BufMut);
    fn read_from(buf: &mut impl Buf) -> Result<Self, ProtocolError>;
}

/// Fails with [`ProtocolError::BufferTooShort`] unless `n` bytes remain.
pub fn ensure(buf: &impl Buf, n: usize) -> Result<(), ProtocolError> {
    if buf.remaining() < n {
        return Err(ProtocolError::BufferTooShort {
            needed: n,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Reads a length prefix and rejects negatives.
pub fn read_len(buf: &mut impl Buf) -> Result<usize, ProtocolError> {
    let len = read_varint(buf)?;
    usize::try_from(len)
        .map_err(|_| ProtocolError::InvalidMessage(format!("negative length {len}")))
}

/// Writes a protocol string: VarInt byte length + UTF-8.
pub fn write_string(buf: &mut impl BufMut, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Reads a protocol string of at most `max_chars` characters.
pub fn read_string(buf: &mut impl Buf, max_chars: usize) -> Result<String, ProtocolError> {
    let len = read_len(buf)?;
    // A UTF-8 char is at most 4 bytes; anything longer cannot be legal.
    if len > max_chars * 4 {
        return Err(ProtocolError::StringTooLong {
            len,
            max: max_chars,
        });
    }
    ensure(buf, len)?;
    let data = buf.copy_to_bytes(len);
    let s = String::from_utf8(data.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)?;
    let chars = s.chars().count();
    if chars > max_chars {
        return Err(ProtocolError::StringTooLong {
            len: chars,
            max: max_chars,
        });
    }
    Ok(s)
}

/// Writes a VarInt-prefixed byte array.
pub fn write_byte_array(buf: &mut impl BufMut, data: &[u8]) {
    write_varint(buf, data.len() as i32);
    buf.put_slice(data);
}

/// Reads a VarInt-prefixed byte array.
pub fn read_byte_array(buf: &mut impl Buf) -> Result<Vec<u8>, ProtocolError> {
    let len = read_len(buf)?;
    ensure(buf, len)?;
    Ok(buf.copy_to_bytes(len).to_vec())
}

/// Takes whatever is left in the body.
pub fn read_rest(buf: &mut impl Buf) -> Bytes {
    buf.copy_to_bytes(buf.remaining())
}

pub fn write_bool(buf: &mut impl BufMut, value: bool) {
    buf.put_u8(u8::from(value));
}

pub fn read_bool(buf: &mut impl Buf) -> Result<bool, ProtocolError> {
    ensure(buf, 1)?;
    match buf.get_u8() {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ProtocolError::InvalidMessage(format!("invalid bool byte {other}"))),
    }
}

pub fn read_u8(buf: &mut impl Buf) -> Result<u8, ProtocolError> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

pub fn read_i8(buf: &mut impl Buf) -> Result<i8, ProtocolError> {
    ensure(buf, 1)?;
    Ok(buf.get_i8())
}

pub fn read_u16(buf: &mut impl Buf) -> Result<u16, ProtocolError> {
    ensure(buf, 2)?;
    Ok(buf.get_u16())
}

pub fn read_i32(buf: &mut impl Buf) -> Result<i32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_i32())
}

pub fn read_i64(buf: &mut impl Buf) -> Result<i64, ProtocolError> {
    ensure(buf, 8)?;
    Ok(buf.get_i64())
}

pub fn read_f32(buf: &mut impl Buf) -> Result<f32, ProtocolError> {
    ensure(buf, 4)?;
    Ok(buf.get_f32())
}

pub fn read_f64(buf: &mut impl Buf) -> Result<f64, ProtocolError> {
    ensure(buf, 8)?;
    Ok(buf.get_f64())
}

/// UUIDs travel as a big-endian 128-bit integer.
pub fn write_uuid(buf: &mut impl BufMut, uuid: &Uuid) {
    buf.put_u128(uuid.as_u128());
}

pub fn read_uuid(buf: &mut impl Buf) -> Result<Uuid, ProtocolError> {
    ensure(buf, 16)?;
    Ok(Uuid::from_u128(buf.get_u128()))
}

/// Writes a VarInt count followed by each element.
pub fn write_array<T: Wire>(buf: &mut impl BufMut, items: &[T]) {
    write_varint(buf, items.len() as i32);
    for item in items {
        item.write_to(buf);
    }
}

/// Reads a VarInt count followed by that many elements.
///
/// The count is not trusted for preallocation: each element needs at
/// least one byte, so a count above `remaining()` is rejected up front.
pub fn read_array<T: Wire>(buf: &mut impl Buf) -> Result<Vec<T>, ProtocolError> {
    let count = read_len(buf)?;
    ensure(buf, count)?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(T::read_from(buf)?);
    }
    Ok(items)
}
