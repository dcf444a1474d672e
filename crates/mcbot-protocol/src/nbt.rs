//! Minimal network NBT, just enough for text components.
//!
//! Since 1.20.3 chat and disconnect reasons in the Configuration and Play
//! states are sent as NBT instead of JSON. Network NBT has a nameless root:
//! one tag-type byte, then the payload. We convert the tree to a
//! `serde_json::Value` so both encodings share one renderer.

use bytes::{Buf, BufMut};
use serde_json::{Map, Number, Value};

use crate::buf::ensure;
use crate::ProtocolError;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

/// Nesting deeper than this is rejected rather than recursed into.
const MAX_DEPTH: usize = 512;

/// Reads one nameless network NBT value.
pub fn read_network_nbt(buf: &mut impl Buf) -> Result<Value, ProtocolError> {
    ensure(buf, 1)?;
    let tag = buf.get_u8();
    if tag == TAG_END {
        return Ok(Value::Null);
    }
    read_payload(buf, tag, 0)
}

/// Writes `value` as nameless network NBT.
///
/// Strings become string tags, objects compounds, booleans bytes, and
/// arrays lists (of compounds when the elements are mixed).
pub fn write_network_nbt(buf: &mut impl BufMut, value: &Value) {
    buf.put_u8(tag_of(value));
    write_payload(buf, value);
}

fn read_payload(buf: &mut impl Buf, tag: u8, depth: usize) -> Result<Value, ProtocolError> {
    if depth > MAX_DEPTH {
        return Err(ProtocolError::Nbt("nesting too deep".into()));
    }
    let value = match tag {
        TAG_BYTE => {
            ensure(buf, 1)?;
            Value::from(buf.get_i8())
        }
        TAG_SHORT => {
            ensure(buf, 2)?;
            Value::from(buf.get_i16())
        }
        TAG_INT => {
            ensure(buf, 4)?;
            Value::from(buf.get_i32())
        }
        TAG_LONG => {
            ensure(buf, 8)?;
            Value::from(buf.get_i64())
        }
        TAG_FLOAT => {
            ensure(buf, 4)?;
            float(buf.get_f32() as f64)
        }
        TAG_DOUBLE => {
            ensure(buf, 8)?;
            float(buf.get_f64())
        }
        TAG_BYTE_ARRAY => {
            let len = read_array_len(buf, 1)?;
            Value::Array((0..len).map(|_| Value::from(buf.get_i8())).collect())
        }
        TAG_STRING => Value::String(read_nbt_string(buf)?),
        TAG_LIST => {
            ensure(buf, 1)?;
            let elem = buf.get_u8();
            let len = read_array_len(buf, 0)?;
            let mut items = Vec::with_capacity(len.min(buf.remaining()));
            for _ in 0..len {
                items.push(read_payload(buf, elem, depth + 1)?);
            }
            Value::Array(items)
        }
        TAG_COMPOUND => {
            let mut map = Map::new();
            loop {
                ensure(buf, 1)?;
                let child = buf.get_u8();
                if child == TAG_END {
                    break;
                }
                let name = read_nbt_string(buf)?;
                let value = read_payload(buf, child, depth + 1)?;
                map.insert(name, value);
            }
            Value::Object(map)
        }
        TAG_INT_ARRAY => {
            let len = read_array_len(buf, 4)?;
            Value::Array((0..len).map(|_| Value::from(buf.get_i32())).collect())
        }
        TAG_LONG_ARRAY => {
            let len = read_array_len(buf, 8)?;
            Value::Array((0..len).map(|_| Value::from(buf.get_i64())).collect())
        }
        other => return Err(ProtocolError::Nbt(format!("unknown tag type {other}"))),
    };
    Ok(value)
}

/// Reads an i32 element count and checks the elements are all present.
fn read_array_len(buf: &mut impl Buf, elem_size: usize) -> Result<usize, ProtocolError> {
    ensure(buf, 4)?;
    let len = buf.get_i32();
    let len = usize::try_from(len).map_err(|_| ProtocolError::Nbt(format!("negative length {len}")))?;
    ensure(buf, len.saturating_mul(elem_size))?;
    Ok(len)
}

/// NBT strings are u16-prefixed (modified) UTF-8. Plain UTF-8 decoding is
/// close enough for chat text; invalid sequences are replaced.
fn read_nbt_string(buf: &mut impl Buf) -> Result<String, ProtocolError> {
    ensure(buf, 2)?;
    let len = buf.get_u16() as usize;
    ensure(buf, len)?;
    let data = buf.copy_to_bytes(len);
    Ok(String::from_utf8_lossy(&data).into_owned())
}

fn write_nbt_string(buf: &mut impl BufMut, s: &str) {
    let bytes = s.as_bytes();
    let len = bytes.len().min(u16::MAX as usize);
    buf.put_u16(len as u16);
    buf.put_slice(&bytes[..len]);
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn tag_of(value: &Value) -> u8 {
    match value {
        Value::Null => TAG_END,
        Value::Bool(_) => TAG_BYTE,
        Value::Number(n) if n.is_f64() => TAG_DOUBLE,
        Value::Number(n) => match n.as_i64() {
            Some(v) if i32::try_from(v).is_ok() => TAG_INT,
            _ => TAG_LONG,
        },
        Value::String(_) => TAG_STRING,
        Value::Array(_) => TAG_LIST,
        Value::Object(_) => TAG_COMPOUND,
    }
}

fn write_payload(buf: &mut impl BufMut, value: &Value) {
    match value {
        Value::Null => {}
        Value::Bool(b) => buf.put_i8(i8::from(*b)),
        Value::Number(n) => match tag_of(value) {
            TAG_DOUBLE => buf.put_f64(n.as_f64().unwrap_or_default()),
            TAG_INT => buf.put_i32(n.as_i64().unwrap_or_default() as i32),
            _ => buf.put_i64(n.as_i64().unwrap_or_default()),
        },
        Value::String(s) => write_nbt_string(buf, s),
        Value::Array(items) => {
            let first = items.first().map(tag_of).unwrap_or(TAG_END);
            let uniform = items.iter().all(|v| tag_of(v) == first);
            if uniform {
                buf.put_u8(first);
                buf.put_i32(items.len() as i32);
                for item in items {
                    write_payload(buf, item);
                }
            } else {
                // Heterogeneous lists are written as compounds, the way the
                // game itself wraps mixed text components.
                buf.put_u8(TAG_COMPOUND);
                buf.put_i32(items.len() as i32);
                for item in items {
                    match item {
                        Value::Object(_) => write_payload(buf, item),
                        other => {
                            let mut map = Map::new();
                            map.insert("text".into(), Value::String(plain_scalar(other)));
                            write_payload(buf, &Value::Object(map));
                        }
                    }
                }
            }
        }
        Value::Object(map) => {
            for (name, child) in map {
                if child.is_null() {
                    continue;
                }
                buf.put_u8(tag_of(child));
                write_nbt_string(buf, name);
                write_payload(buf, child);
            }
            buf.put_u8(TAG_END);
        }
    }
}

fn plain_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
