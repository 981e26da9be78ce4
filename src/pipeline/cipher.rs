//! AES-GCM payload encryption.
//!
//! Wire layout: `nonce (12 bytes) || ciphertext || tag (16 bytes)`. The key
//! length picks the variant: 16, 24 or 32 bytes for AES-128/192/256.

use crate::error::{GatewayError, IngestError, Result};
use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use sha2::{Digest, Sha256};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

type Aes192Gcm = AesGcm<Aes192, U12>;

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub enum PayloadCipher {
    Aes128(Aes128Gcm),
    Aes192(Aes192Gcm),
    Aes256(Aes256Gcm),
}

impl PayloadCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        let invalid = |_| GatewayError::Key(format!("cannot build cipher from {} byte key", key.len()));
        match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(Self::Aes128).map_err(invalid),
            24 => Aes192Gcm::new_from_slice(key).map(Self::Aes192).map_err(invalid),
            32 => Aes256Gcm::new_from_slice(key).map(Self::Aes256).map_err(invalid),
            n => Err(GatewayError::Key(format!(
                "key must be 16, 24 or 32 bytes, got {n}"
            ))),
        }
    }

    pub fn key_bits(&self) -> usize {
        match self {
            PayloadCipher::Aes128(_) => 128,
            PayloadCipher::Aes192(_) => 192,
            PayloadCipher::Aes256(_) => 256,
        }
    }

    /// Open a `nonce || ciphertext` frame.
    pub fn decrypt(&self, frame: &[u8]) -> std::result::Result<Vec<u8>, IngestError> {
        if frame.len() < NONCE_LEN + TAG_LEN {
            return Err(IngestError::Security(format!(
                "ciphertext of {} bytes is shorter than nonce plus tag",
                frame.len()
            )));
        }
        let (nonce, ciphertext) = frame.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);
        let opened = match self {
            PayloadCipher::Aes128(c) => c.decrypt(nonce, ciphertext),
            PayloadCipher::Aes192(c) => c.decrypt(nonce, ciphertext),
            PayloadCipher::Aes256(c) => c.decrypt(nonce, ciphertext),
        };
        opened.map_err(|_| IngestError::Security("authentication tag mismatch".to_string()))
    }

    /// Seal `plaintext` under `nonce`, returning `nonce || ciphertext`.
    pub fn encrypt(&self, nonce: &[u8; NONCE_LEN], plaintext: &[u8]) -> Result<Vec<u8>> {
        let n = Nonce::from_slice(nonce);
        let sealed = match self {
            PayloadCipher::Aes128(c) => c.encrypt(n, plaintext),
            PayloadCipher::Aes192(c) => c.encrypt(n, plaintext),
            PayloadCipher::Aes256(c) => c.encrypt(n, plaintext),
        }
        .map_err(|_| GatewayError::Key("encryption failed".to_string()))?;

        let mut frame = Vec::with_capacity(NONCE_LEN + sealed.len());
        frame.extend_from_slice(nonce);
        frame.extend_from_slice(&sealed);
        Ok(frame)
    }
}

/// First 8 hex chars of the key's SHA-256, safe to log.
pub fn fingerprint(key: &[u8]) -> String {
    let digest = Sha256::digest(key);
    hex::encode(digest)[..8].to_string()
}

/// The process-wide decryption key, replaceable at runtime.
///
/// Decoders take a cheap `Arc` snapshot under the read lock, so a reload never
/// waits on in-flight decryptions.
#[derive(Default)]
pub struct EncryptionKey {
    slot: RwLock<Option<(Arc<PayloadCipher>, String)>>,
}

impl EncryptionKey {
    pub fn new(key: &str) -> Result<Self> {
        let this = Self::default();
        this.replace(key)?;
        Ok(this)
    }

    /// Install a new key. An invalid key is rejected and the current one stays.
    ///
    /// Returns whether the active key changed.
    pub fn replace(&self, key: &str) -> Result<bool> {
        let fp = fingerprint(key.as_bytes());
        if self.fingerprint().as_deref() == Some(fp.as_str()) {
            return Ok(false);
        }
        let cipher = match PayloadCipher::new(key.as_bytes()) {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "rejected encryption key, keeping the previous one");
                return Err(e);
            }
        };
        let bits = cipher.key_bits();
        let mut slot = self
            .slot
            .write()
            .map_err(|_| GatewayError::Key("key lock poisoned".to_string()))?;
        *slot = Some((Arc::new(cipher), fp.clone()));
        info!(fingerprint = %fp, bits, "encryption key installed");
        Ok(true)
    }

    pub fn current(&self) -> Option<Arc<PayloadCipher>> {
        self.slot
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|(c, _)| c.clone()))
    }

    pub fn fingerprint(&self) -> Option<String> {
        self.slot
            .read()
            .ok()
            .and_then(|s| s.as_ref().map(|(_, fp)| fp.clone()))
    }

    /// Decrypt with the active key. No key configured fails closed.
    pub fn decrypt(&self, frame: &[u8]) -> std::result::Result<Vec<u8>, IngestError> {
        let cipher = self
            .current()
            .ok_or_else(|| IngestError::Security("no encryption key configured".to_string()))?;
        cipher.decrypt(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_128: &str = "0123456789abcdef";
    const KEY_192: &str = "0123456789abcdef01234567";
    const KEY_256: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_all_key_sizes_open_their_own_frames() {
        for key in [KEY_128, KEY_192, KEY_256] {
            let cipher = PayloadCipher::new(key.as_bytes()).unwrap();
            assert_eq!(cipher.key_bits(), key.len() * 8);
            let frame = cipher.encrypt(&[7u8; NONCE_LEN], b"{\"a\":1}").unwrap();
            assert_eq!(&frame[..NONCE_LEN], &[7u8; NONCE_LEN]);
            assert_eq!(cipher.decrypt(&frame).unwrap(), b"{\"a\":1}");
        }
    }

    #[test]
    fn test_invalid_key_lengths() {
        assert!(PayloadCipher::new(b"short").is_err());
        assert!(PayloadCipher::new(&[0u8; 33]).is_err());
        assert!(EncryptionKey::new("").is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let frame = PayloadCipher::new(KEY_128.as_bytes())
            .unwrap()
            .encrypt(&[1u8; NONCE_LEN], b"payload")
            .unwrap();
        let other = PayloadCipher::new(b"fedcba9876543210").unwrap();
        assert!(matches!(other.decrypt(&frame), Err(IngestError::Security(_))));
    }

    #[test]
    fn test_tampered_frame_fails() {
        let cipher = PayloadCipher::new(KEY_256.as_bytes()).unwrap();
        let mut frame = cipher.encrypt(&[3u8; NONCE_LEN], b"payload").unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0x01;
        assert!(cipher.decrypt(&frame).is_err());

        let mut frame = cipher.encrypt(&[3u8; NONCE_LEN], b"payload").unwrap();
        frame[NONCE_LEN] ^= 0x80;
        assert!(cipher.decrypt(&frame).is_err());
    }

    #[test]
    fn test_short_frame_fails() {
        let cipher = PayloadCipher::new(KEY_128.as_bytes()).unwrap();
        assert!(cipher.decrypt(&[]).is_err());
        assert!(cipher.decrypt(&[0u8; NONCE_LEN + TAG_LEN - 1]).is_err());
    }

    #[test]
    fn test_replace_keeps_previous_key_on_error() {
        let key = EncryptionKey::new(KEY_128).unwrap();
        let before = key.fingerprint().unwrap();
        assert!(key.replace("not-a-valid-length").is_err());
        assert_eq!(key.fingerprint().unwrap(), before);

        assert!(!key.replace(KEY_128).unwrap());
        assert!(key.replace(KEY_256).unwrap());
        assert_ne!(key.fingerprint().unwrap(), before);
        assert_eq!(key.current().unwrap().key_bits(), 256);
    }

    #[test]
    fn test_missing_key_fails_closed() {
        let key = EncryptionKey::default();
        assert!(matches!(key.decrypt(&[0u8; 64]), Err(IngestError::Security(_))));
    }

    #[test]
    fn test_fingerprint_is_short_and_stable() {
        let fp = fingerprint(KEY_128.as_bytes());
        assert_eq!(fp.len(), 8);
        assert_eq!(fp, fingerprint(KEY_128.as_bytes()));
        assert_ne!(fp, fingerprint(KEY_256.as_bytes()));
    }
}
