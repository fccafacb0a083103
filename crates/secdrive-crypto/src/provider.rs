//! Crypto providers
//!
//! Every primitive call the engine makes goes through a [`CryptoProvider`].
//! Only randomness is required; import, encrypt and decrypt default to the
//! `aes-gcm` implementation.

use crate::{
    keys::{CryptoKeyHandle, Iv, IV_SIZE},
    CryptoError, Result,
};
use aes_gcm::aead::Aead;
use rand::rngs::OsRng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Source of randomness and symmetric primitives
pub trait CryptoProvider: Send + Sync {
    /// Fill `dest` with random bytes
    fn random_bytes(&self, dest: &mut [u8]);

    /// Produce a fresh IV. Must never repeat for the same key.
    fn random_iv(&self) -> Iv {
        let mut bytes = [0u8; IV_SIZE];
        self.random_bytes(&mut bytes);
        Iv::new(bytes)
    }

    /// Import raw key bytes as a non-extractable handle
    fn import_key(&self, raw: &[u8]) -> Result<CryptoKeyHandle> {
        CryptoKeyHandle::import(raw)
    }

    /// AES-256-GCM encrypt; the 16-byte tag is appended to the output
    fn encrypt(&self, key: &CryptoKeyHandle, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = aes_gcm::Nonce::from_slice(iv.as_bytes());
        key.cipher()
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(e.to_string()))
    }

    /// AES-256-GCM decrypt with tag verification
    fn decrypt(&self, key: &CryptoKeyHandle, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let nonce = aes_gcm::Nonce::from_slice(iv.as_bytes());
        key.cipher()
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }
}

/// Provider backed by the operating system RNG
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemCryptoProvider;

impl CryptoProvider for SystemCryptoProvider {
    fn random_bytes(&self, dest: &mut [u8]) {
        rand::RngCore::fill_bytes(&mut OsRng, dest);
    }
}

/// Deterministic provider for tests only.
///
/// IVs are `prefix (4 bytes) || counter (8 bytes, big-endian)`. One instance
/// never repeats an IV, but every instance starts its counter at zero, so two
/// instances with the same prefix hand out the same IVs. Under one key that
/// breaks GCM confidentiality and authenticity. Never use it for real data;
/// [`SystemCryptoProvider`] is the production provider.
#[derive(Debug)]
pub struct SequentialIvProvider {
    prefix: [u8; 4],
    counter: AtomicU64,
}

impl SequentialIvProvider {
    /// Create a provider whose IVs start with `prefix`
    pub fn new(prefix: [u8; 4]) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    /// Number of IVs handed out so far
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl Default for SequentialIvProvider {
    fn default() -> Self {
        Self::new([0u8; 4])
    }
}

impl CryptoProvider for SequentialIvProvider {
    fn random_bytes(&self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let n = self.counter.fetch_add(1, Ordering::SeqCst).to_be_bytes();
            chunk.copy_from_slice(&n[..chunk.len()]);
        }
    }

    fn random_iv(&self) -> Iv {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let mut bytes = [0u8; IV_SIZE];
        bytes[..4].copy_from_slice(&self.prefix);
        bytes[4..].copy_from_slice(&n.to_be_bytes());
        Iv::new(bytes)
    }
}
