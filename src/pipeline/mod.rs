//! Secure decode pipeline: decrypt, inflate, parse.
//!
//! Each stage fails closed with an [`IngestError`] whose `Display` names the
//! precise cause for the server log; clients only ever see the generic
//! message for its class.

pub mod cipher;
pub mod compress;
pub mod envelope;

pub use cipher::{fingerprint, EncryptionKey, PayloadCipher, NONCE_LEN};
pub use envelope::RawEnvelope;

use crate::error::{GatewayError, IngestError, Result};
use crate::metrics::IngestMetrics;
use rand::RngCore;

/// Decrypt and inflate `body`, then parse the envelope.
pub fn open(
    key: &EncryptionKey,
    body: &[u8],
    max_decompressed: usize,
) -> std::result::Result<RawEnvelope, IngestError> {
    let compressed = key.decrypt(body)?;
    let json = compress::decompress(&compressed, max_decompressed)?;
    IngestMetrics::record_decompressed_bytes(json.len());
    RawEnvelope::parse(&json)
}

/// Agent-side encoding: gzip `payload`, then seal it under `key` with a
/// random nonce.
pub fn seal(key: &str, payload: &[u8]) -> Result<Vec<u8>> {
    let cipher = PayloadCipher::new(key.as_bytes())?;
    let packed = compress::compress(payload).map_err(GatewayError::Io)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);
    cipher.encrypt(&nonce, &packed)
}
