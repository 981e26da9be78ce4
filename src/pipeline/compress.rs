use crate::error::IngestError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Inflate a gzip stream, refusing output larger than `limit` bytes.
pub fn decompress(data: &[u8], limit: usize) -> Result<Vec<u8>, IngestError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| IngestError::Format(format!("gzip: {e}")))?;
    if out.len() > limit {
        return Err(IngestError::Format(format!(
            "decompressed payload exceeds {limit} bytes"
        )));
    }
    Ok(out)
}

pub fn compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inflates_gzip() {
        let packed = compress(b"{\"project\":\"p\"}").unwrap();
        assert_eq!(decompress(&packed, 1024).unwrap(), b"{\"project\":\"p\"}");
    }

    #[test]
    fn test_rejects_non_gzip() {
        assert!(matches!(
            decompress(b"plain text", 1024),
            Err(IngestError::Format(_))
        ));
    }

    #[test]
    fn test_output_cap() {
        let big = vec![b'a'; 4096];
        let packed = compress(&big).unwrap();
        assert_eq!(decompress(&packed, 4096).unwrap().len(), 4096);
        assert!(decompress(&packed, 4095).is_err());
    }
}
