//! zlib body compression.
//!
//! Once the server sends `SetCompression`, every frame body starts with a
//! VarInt `data_length`:
//!
//! ```text
//! data_length == 0  →  the rest is the uncompressed body (below threshold)
//! data_length  > 0  →  the rest is zlib; inflates to exactly data_length
//! ```

use std::io::{Read, Write};

use bytes::{Buf, Bytes, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::varint::{read_varint, write_varint};
use crate::ProtocolError;

/// Hard cap on a declared uncompressed length (8 MiB).
pub const MAX_DECOMPRESSED_LEN: usize = 8 * 1024 * 1024;

/// Wraps `body` for a connection with compression `threshold`.
///
/// Bodies of at least `threshold` bytes are compressed.
pub fn compress_body(body: &[u8], threshold: usize) -> Result<BytesMut, ProtocolError> {
    let mut out = BytesMut::with_capacity(body.len() + 5);
    if body.len() < threshold {
        write_varint(&mut out, 0);
        out.extend_from_slice(body);
        return Ok(out);
    }
    write_varint(&mut out, body.len() as i32);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(body).map_err(ProtocolError::Compression)?;
    let compressed = encoder.finish().map_err(ProtocolError::Compression)?;
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Unwraps a compressed-format body.
///
/// # Errors
/// - [`ProtocolError::DecompressedTooLarge`] above [`MAX_DECOMPRESSED_LEN`].
/// - [`ProtocolError::BelowThreshold`] if a small body was compressed.
/// - [`ProtocolError::LengthMismatch`] if inflating yields a different size.
pub fn decompress_body(mut frame: Bytes, threshold: usize) -> Result<Bytes, ProtocolError> {
    let declared = read_varint(&mut frame)?;
    let declared = usize::try_from(declared).map_err(|_| {
        ProtocolError::InvalidMessage(format!("negative data length {declared}"))
    })?;
    if declared == 0 {
        return Ok(frame);
    }
    if declared > MAX_DECOMPRESSED_LEN {
        return Err(ProtocolError::DecompressedTooLarge {
            declared,
            max: MAX_DECOMPRESSED_LEN,
        });
    }
    if declared < threshold {
        return Err(ProtocolError::BelowThreshold { declared, threshold });
    }

    // Read at most one byte past the declared size so an oversized
    // stream is detected without inflating all of it.
    let mut out = Vec::with_capacity(declared);
    ZlibDecoder::new(frame.chunk())
        .take(declared as u64 + 1)
        .read_to_end(&mut out)
        .map_err(ProtocolError::Compression)?;
    if out.len() != declared {
        return Err(ProtocolError::LengthMismatch {
            declared,
            actual: out.len(),
        });
    }
    Ok(Bytes::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_body_at_threshold_is_compressed() {
        let body = vec![7u8; 256];
        let wrapped = compress_body(&body, 256).unwrap();
        // data_length = 256 → 0x80 0x02
        assert_eq!(&wrapped[..2], &[0x80, 0x02]);
        assert!(wrapped.len() < body.len());
        let back = decompress_body(wrapped.freeze(), 256).unwrap();
        assert_eq!(&back[..], &body[..]);
    }

    #[test]
    fn test_compress_body_below_threshold_is_raw() {
        let body = vec![7u8; 255];
        let wrapped = compress_body(&body, 256).unwrap();
        assert_eq!(wrapped[0], 0x00);
        assert_eq!(&wrapped[1..], &body[..]);
        let back = decompress_body(wrapped.freeze(), 256).unwrap();
        assert_eq!(&back[..], &body[..]);
    }

    #[test]
    fn test_decompress_body_declared_length_mismatch_rejected() {
        let body = vec![1u8; 300];
        let wrapped = compress_body(&body, 256).unwrap();
        // Rewrite the declared length from 300 (0xAC 0x02) to 301.
        let mut tampered = BytesMut::from(&wrapped[..]);
        tampered[0] = 0xAD;
        let result = decompress_body(tampered.freeze(), 256);
        assert!(matches!(
            result,
            Err(ProtocolError::LengthMismatch {
                declared: 301,
                actual: 300
            })
        ));
    }

    #[test]
    fn test_decompress_body_over_cap_rejected() {
        let mut frame = BytesMut::new();
        write_varint(&mut frame, (MAX_DECOMPRESSED_LEN + 1) as i32);
        let result = decompress_body(frame.freeze(), 256);
        assert!(matches!(result, Err(ProtocolError::DecompressedTooLarge { .. })));
    }

    #[test]
    fn test_decompress_body_below_threshold_rejected() {
        let body = vec![1u8; 100];
        let wrapped = compress_body(&body, 64).unwrap();
        let result = decompress_body(wrapped.freeze(), 256);
        assert!(matches!(result, Err(ProtocolError::BelowThreshold { .. })));
    }

    #[test]
    fn test_decompress_body_garbage_rejected() {
        let mut frame = BytesMut::new();
        write_varint(&mut frame, 300);
        frame.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(decompress_body(frame.freeze(), 256).is_err());
    }
}
