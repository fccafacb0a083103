//! File encryption engine
//!
//! Encrypts whole file payloads with AES-256-GCM. Each call to
//! [`FileCryptoEngine::encrypt`] draws a new IV from the provider; reusing
//! an IV under the same key would break GCM confidentiality, so callers
//! never supply one.

use crate::{
    blob::{pack, unpack},
    keys::{CryptoKeyHandle, Iv, RawKey},
    provider::{CryptoProvider, SystemCryptoProvider},
    Result,
};
use bytes::Bytes;
use std::sync::Arc;

/// AES-256-GCM file encryption over a [`CryptoProvider`]
#[derive(Clone)]
pub struct FileCryptoEngine {
    provider: Arc<dyn CryptoProvider>,
}

impl FileCryptoEngine {
    /// Create an engine backed by the given provider
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    /// Get the provider
    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    /// Import raw key bytes as a non-extractable key handle
    pub fn import_key(&self, raw: &[u8]) -> Result<CryptoKeyHandle> {
        self.provider.import_key(raw)
    }

    /// Import a base64-encoded key, as carried by the KMS and the session cache
    pub fn import_key_base64(&self, encoded: &str) -> Result<CryptoKeyHandle> {
        let raw = RawKey::from_base64(encoded)?;
        self.import_key(raw.as_bytes())
    }

    /// Encrypt a payload under a fresh IV.
    ///
    /// Returns the ciphertext (with appended tag) and the IV that was used.
    pub fn encrypt(&self, plaintext: &[u8], key: &CryptoKeyHandle) -> Result<(Vec<u8>, Iv)> {
        let iv = self.provider.random_iv();
        let ciphertext = self.provider.encrypt(key, &iv, plaintext)?;
        Ok((ciphertext, iv))
    }

    /// Decrypt and verify a payload.
    ///
    /// Fails with `AuthenticationFailed` if the tag does not verify; no
    /// plaintext is returned in that case.
    pub fn decrypt(&self, ciphertext: &[u8], key: &CryptoKeyHandle, iv: &Iv) -> Result<Vec<u8>> {
        self.provider.decrypt(key, iv, ciphertext)
    }

    /// Encrypt and frame a payload for upload
    pub fn seal(&self, plaintext: &[u8], key: &CryptoKeyHandle) -> Result<Bytes> {
        let (ciphertext, iv) = self.encrypt(plaintext, key)?;
        Ok(pack(&iv, &ciphertext))
    }

    /// Unframe and decrypt a downloaded blob
    pub fn open(&self, blob: &[u8], key: &CryptoKeyHandle) -> Result<Vec<u8>> {
        let (iv, ciphertext) = unpack(blob)?;
        self.decrypt(ciphertext, key, &iv)
    }
}

impl Default for FileCryptoEngine {
    fn default() -> Self {
        Self::new(Arc::new(SystemCryptoProvider))
    }
}

impl std::fmt::Debug for FileCryptoEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCryptoEngine").finish_non_exhaustive()
    }
}
