//! VarInt and VarLong: the protocol's variable-length integers.
//!
//! Each byte carries 7 bits of the value, least-significant group first.
//! The high bit (`0x80`) says "another byte follows". Negative numbers are
//! plain two's complement, so `-1` always takes the full 5 bytes.
//!
//! ```text
//!   0   → 00
//!   127 → 7F
//!   128 → 80 01
//!   -1  → FF FF FF FF 0F
//! ```

use bytes::{Buf, BufMut};

use crate::ProtocolError;

/// Longest legal VarInt encoding.
pub const VARINT_MAX_BYTES: usize = 5;

/// Longest legal VarLong encoding.
pub const VARLONG_MAX_BYTES: usize = 10;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

/// Writes `value` as a VarInt.
pub fn write_varint(buf: &mut impl BufMut, value: i32) {
    let mut v = value as u32;
    loop {
        if v & !(SEGMENT_BITS as u32) == 0 {
            buf.put_u8(v as u8);
            return;
        }
        buf.put_u8((v as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        v >>= 7;
    }
}

/// Reads a VarInt.
///
/// # Errors
/// - [`ProtocolError::BufferTooShort`] if the buffer ends mid-number.
/// - [`ProtocolError::VarIntTooLong`] if a 5th byte still has the
///   continuation bit set.
pub fn read_varint(buf: &mut impl Buf) -> Result<i32, ProtocolError> {
    let mut result: u32 = 0;
    for i in 0..VARINT_MAX_BYTES {
        if !buf.has_remaining() {
            return Err(ProtocolError::BufferTooShort {
                needed: 1,
                remaining: 0,
            });
        }
        let byte = buf.get_u8();
        result |= ((byte & SEGMENT_BITS) as u32) << (7 * i);
        if byte & CONTINUE_BIT == 0 {
            return Ok(result as i32);
        }
    }
    Err(ProtocolError::VarIntTooLong {
        max_bytes: VARINT_MAX_BYTES,
    })
}

/// Number of bytes `value` occupies as a VarInt.
pub fn varint_len(value: i32) -> usize {
    let v = value as u32;
    match v {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Decodes a VarInt from the front of `bytes` without consuming anything.
///
/// Returns `Ok(None)` when `bytes` ends before the number does, and
/// `Ok(Some((value, len)))` once it is complete. `max_bytes` tightens the
/// limit below 5 (frame lengths use 3).
///
/// # Errors
/// [`ProtocolError::VarIntTooLong`] once `max_bytes` bytes have been seen
/// and all of them had the continuation bit set.
pub fn peek_varint(bytes: &[u8], max_bytes: usize) -> Result<Option<(i32, usize)>, ProtocolError> {
    let mut result: u32 = 0;
    for (i, byte) in bytes.iter().take(max_bytes).enumerate() {
        result |= ((byte & SEGMENT_BITS) as u32) << (7 * i);
        if byte & CONTINUE_BIT == 0 {
            return Ok(Some((result as i32, i + 1)));
        }
    }
    if bytes.len() >= max_bytes {
        return Err(ProtocolError::VarIntTooLong { max_bytes });
    }
    Ok(None)
}

/// Writes `value` as a VarLong.
pub fn write_varlong(buf: &mut impl BufMut, value: i64) {
    let mut v = value as u64;
    loop {
        if v & !(SEGMENT_BITS as u64) == 0 {
            buf.put_u8(v as u8);
            return;
        }
        buf.put_u8((v as u8 & SEGMENT_BITS) | CONTINUE_BIT);
        v >>= 7;
    }
}

/// Reads a VarLong.
///
/// # Errors
/// Same as [`read_varint`], with a 10-byte limit.
pub fn read_varlong(buf: &mut impl Buf) -> Result<i64, ProtocolError> {
    let mut result: u64 = 0;
    for i in 0..VARLONG_MAX_BYTES {
        if !buf.has_remaining() {
            return Err(ProtocolError::BufferTooShort {
                needed: 1,
                remaining: 0,
            });
        }
        let byte = buf.get_u8();
        result |= ((byte & SEGMENT_BITS) as u64) << (7 * i);
        if byte & CONTINUE_BIT == 0 {
            return Ok(result as i64);
        }
    }
    Err(ProtocolError::VarIntTooLong {
        max_bytes: VARLONG_MAX_BYTES,
    })
}
