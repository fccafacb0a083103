//! Key material and key handles
//!
//! A data key arrives from the KMS as base64 text. [`RawKey`] carries those
//! bytes for as long as the session cache needs them and wipes them on
//! drop. [`CryptoKeyHandle`] is what encryption actually uses: an imported
//! AES-256-GCM key that has no accessor for the raw bytes.

use crate::{CryptoError, Result};
use aes_gcm::{Aes256Gcm, KeyInit};
use base64::Engine;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a data key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-GCM initialization vector in bytes (96 bits)
pub const IV_SIZE: usize = 12;

/// Size of the GCM authentication tag appended to ciphertext
pub const TAG_SIZE: usize = 16;

/// Raw plaintext data key bytes
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct RawKey {
    bytes: Vec<u8>,
}

impl RawKey {
    /// Wrap raw key bytes without validating their length.
    ///
    /// Length is checked when the key is imported, so a malformed key
    /// surfaces as an import failure where it can be handled.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Decode from base64
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(s)?;
        Ok(Self { bytes })
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of key bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the key is empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for RawKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RawKey([REDACTED; {}])", self.bytes.len())
    }
}

/// An AES-GCM initialization vector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Iv {
    bytes: [u8; IV_SIZE],
}

impl Iv {
    /// Create from a fixed-size array
    pub const fn new(bytes: [u8; IV_SIZE]) -> Self {
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; IV_SIZE] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidIv(format!(
                "iv must be {} bytes, got {}",
                IV_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self { bytes })
    }

    /// Get the IV bytes
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.bytes
    }
}

/// An imported, non-exportable AES-256-GCM key.
///
/// Cloning is cheap and shares the expanded key schedule.
#[derive(Clone)]
pub struct CryptoKeyHandle {
    cipher: Arc<Aes256Gcm>,
}

impl CryptoKeyHandle {
    /// Import raw key bytes. Only 32-byte keys are accepted.
    pub fn import(raw: &[u8]) -> Result<Self> {
        if raw.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "data key must be {} bytes, got {}",
                KEY_SIZE,
                raw.len()
            )));
        }
        let cipher =
            Aes256Gcm::new_from_slice(raw).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self {
            cipher: Arc::new(cipher),
        })
    }

    /// Import a [`RawKey`]
    pub fn import_raw(raw: &RawKey) -> Result<Self> {
        Self::import(raw.as_bytes())
    }

    pub(crate) fn cipher(&self) -> &Aes256Gcm {
        &self.cipher
    }
}

impl std::fmt::Debug for CryptoKeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CryptoKeyHandle(AES-256-GCM, non-extractable)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_key_base64_roundtrip() {
        let raw = RawKey::from_bytes(vec![7u8; KEY_SIZE]);
        let decoded = RawKey::from_base64(&raw.to_base64()).unwrap();
        assert_eq!(raw, decoded);
    }

    #[test]
    fn test_raw_key_debug_is_redacted() {
        let raw = RawKey::from_bytes(vec![0xAB; KEY_SIZE]);
        let debug = format!("{:?}", raw);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("171"));
    }

    #[test]
    fn test_import_rejects_wrong_length() {
        assert!(matches!(
            CryptoKeyHandle::import(&[0u8; 16]),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(CryptoKeyHandle::import(&[0u8; KEY_SIZE]).is_ok());
    }

    #[test]
    fn test_invalid_base64_key() {
        assert!(matches!(
            RawKey::from_base64("not base64!!"),
            Err(CryptoError::Base64Decode(_))
        ));
    }

    #[test]
    fn test_iv_from_bytes() {
        assert!(Iv::from_bytes(&[1u8; IV_SIZE]).is_ok());
        assert!(matches!(
            Iv::from_bytes(&[1u8; 11]),
            Err(CryptoError::InvalidIv(_))
        ));
    }
}
