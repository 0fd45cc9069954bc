//! zlib compression of container bodies.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::{Error, Result};

/// Compress `data` at `level` (0-9).
///
/// Returns `None` when compression is disabled or would not save space, in
/// which case the body is stored as is.
pub fn compress(data: &[u8], level: u32) -> Result<Option<Vec<u8>>> {
    if level == 0 || data.is_empty() {
        return Ok(None);
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    if compressed.len() >= data.len() {
        return Ok(None);
    }
    Ok(Some(compressed))
}

/// Inflate a body of known uncompressed length.
pub fn decompress(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(expected_len);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::corrupted(format!("zlib: {e}")))?;
    if out.len() != expected_len {
        return Err(Error::corrupted(format!(
            "body inflated to {} bytes, expected {expected_len}",
            out.len()
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_decompress() {
        let original = b"Scene location data repeated many times. ".repeat(100);
        let compressed = compress(&original, 6).expect("compress").expect("smaller");
        assert!(compressed.len() < original.len());
        assert_eq!(decompress(&compressed, original.len()).expect("inflate"), original);
    }

    #[test]
    fn test_level_zero_stores() {
        assert!(compress(b"abc", 0).expect("compress").is_none());
        assert!(compress(&[], 9).expect("compress").is_none());
    }

    #[test]
    fn test_length_mismatch() {
        let data = b"aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_vec();
        let compressed = compress(&data, 9).expect("compress").expect("smaller");
        assert!(matches!(
            decompress(&compressed, data.len() + 1),
            Err(Error::Corrupted(_))
        ));
        assert!(decompress(b"not zlib", 8).is_err());
    }
}
