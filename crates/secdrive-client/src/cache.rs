//! Session key cache
//!
//! Two tiers sit in front of the KMS:
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ SessionKeySlot: one active key, memory   │
//! ├──────────────────────────────────────────┤
//! │ KeyStorage: durable for the session      │
//! │   encryption_key_<user>   plaintext      │
//! │   encrypted_key_<user>    wrapped        │
//! │   decryption_key_<sha256> plaintext      │
//! ├──────────────────────────────────────────┤
//! │ KeyManagementClient (remote)             │
//! └──────────────────────────────────────────┘
//! ```
//!
//! Durable entries are written before the memory slot is filled, and
//! evictions clear both, so the tiers never disagree about which plaintext
//! belongs to a wrapped key. A stored key that no longer imports is evicted
//! and re-fetched; the caller never sees that failure.

use crate::{
    flight::{decrypt_flight, encrypt_flight, FlightLocks},
    storage::{
        decryption_storage_key, encrypted_key_storage_key, encryption_key_storage_key,
        CACHE_KEY_PREFIXES,
    },
    KeyManagementClient, KeyStorage, Result,
};
use parking_lot::RwLock;
use secdrive_crypto::{CryptoError, CryptoKeyHandle, FileCryptoEngine, RawKey};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The active encryption key for a user
#[derive(Clone, Debug)]
pub struct EncryptionKey {
    /// Imported key for encrypting files
    pub crypto_key: CryptoKeyHandle,
    /// Wrapped form to store alongside encrypted files
    pub encrypted_key: String,
}

struct ActiveKey {
    user_id: String,
    crypto_key: CryptoKeyHandle,
    encrypted_key: String,
    // Held so the slot owns the only in-memory plaintext of this key
    #[allow(dead_code)]
    plaintext_key: RawKey,
}

/// Memory tier: the currently active key of the current user.
///
/// One slot per session. Share it between caches with `Arc` to give them
/// the same memory tier.
#[derive(Default)]
pub struct SessionKeySlot {
    slot: RwLock<Option<ActiveKey>>,
}

impl SessionKeySlot {
    /// Create an empty slot
    pub fn new() -> Self {
        Self::default()
    }

    /// User whose key currently occupies the slot
    pub fn user_id(&self) -> Option<String> {
        self.slot.read().as_ref().map(|k| k.user_id.clone())
    }

    /// Wrapped key currently occupying the slot
    pub fn encrypted_key(&self) -> Option<String> {
        self.slot.read().as_ref().map(|k| k.encrypted_key.clone())
    }

    /// Check if the slot is empty
    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }

    /// Drop the active key
    pub fn clear(&self) {
        self.slot.write().take();
    }

    fn active_for(&self, user_id: &str) -> Option<EncryptionKey> {
        self.slot
            .read()
            .as_ref()
            .filter(|k| k.user_id == user_id)
            .map(|k| EncryptionKey {
                crypto_key: k.crypto_key.clone(),
                encrypted_key: k.encrypted_key.clone(),
            })
    }

    fn matching(&self, user_id: &str, encrypted_key: &str) -> Option<CryptoKeyHandle> {
        self.slot
            .read()
            .as_ref()
            .filter(|k| k.user_id == user_id && k.encrypted_key == encrypted_key)
            .map(|k| k.crypto_key.clone())
    }

    fn is_free_for(&self, user_id: &str) -> bool {
        self.slot
            .read()
            .as_ref()
            .map_or(true, |k| k.user_id == user_id)
    }

    fn set(&self, key: ActiveKey) {
        *self.slot.write() = Some(key);
    }
}

/// Multi-tier data key cache in front of the KMS
pub struct KeyCache {
    kms: Arc<dyn KeyManagementClient>,
    storage: Arc<dyn KeyStorage>,
    engine: FileCryptoEngine,
    slot: Arc<SessionKeySlot>,
    flights: FlightLocks,
}

impl KeyCache {
    /// Create a cache with its own memory slot and the system crypto provider
    pub fn new(kms: Arc<dyn KeyManagementClient>, storage: Arc<dyn KeyStorage>) -> Self {
        Self {
            kms,
            storage,
            engine: FileCryptoEngine::default(),
            slot: Arc::new(SessionKeySlot::new()),
            flights: FlightLocks::new(),
        }
    }

    /// Use the given engine to import keys
    pub fn with_engine(mut self, engine: FileCryptoEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Use an existing memory slot
    pub fn with_slot(mut self, slot: Arc<SessionKeySlot>) -> Self {
        self.slot = slot;
        self
    }

    /// Get the memory slot
    pub fn slot(&self) -> &Arc<SessionKeySlot> {
        &self.slot
    }

    /// Get the durable storage
    pub fn storage(&self) -> &Arc<dyn KeyStorage> {
        &self.storage
    }

    /// Get the active encryption key for a user, generating one on a miss
    #[instrument(skip(self))]
    pub async fn get_crypto_key(&self, user_id: &str) -> Result<EncryptionKey> {
        if let Some(key) = self.slot.active_for(user_id) {
            return Ok(key);
        }

        let _flight = self.flights.acquire(&encrypt_flight(user_id)).await;

        // Another caller may have finished while we waited
        if let Some(key) = self.slot.active_for(user_id) {
            debug!("Active key materialized by concurrent request");
            return Ok(key);
        }

        let plaintext_slot = encryption_key_storage_key(user_id);
        let encrypted_slot = encrypted_key_storage_key(user_id);

        let cached_key = self.storage.get(&plaintext_slot).await?;
        let cached_encrypted = self.storage.get(&encrypted_slot).await?;

        if let (Some(cached_key), Some(encrypted_key)) = (cached_key, cached_encrypted) {
            match self.import_cached(&cached_key) {
                Ok((crypto_key, plaintext_key)) => {
                    debug!("Active key restored from session storage");
                    self.slot.set(ActiveKey {
                        user_id: user_id.to_string(),
                        crypto_key: crypto_key.clone(),
                        encrypted_key: encrypted_key.clone(),
                        plaintext_key,
                    });
                    return Ok(EncryptionKey {
                        crypto_key,
                        encrypted_key,
                    });
                }
                Err(e) => {
                    warn!(error = %e, "Cached key failed to import, generating a new one");
                    self.storage.remove(&plaintext_slot).await?;
                    self.storage.remove(&encrypted_slot).await?;
                    self.slot.clear();
                }
            }
        }

        let data_key = self.kms.generate_data_key(user_id).await?;
        let crypto_key = self.engine.import_key(data_key.plaintext_key.as_bytes())?;

        // Plaintext first so a visible wrapped key always has its plaintext
        self.storage
            .set(&plaintext_slot, &data_key.plaintext_key.to_base64())
            .await?;
        self.storage
            .set(&encrypted_slot, &data_key.encrypted_key)
            .await?;

        self.slot.set(ActiveKey {
            user_id: user_id.to_string(),
            crypto_key: crypto_key.clone(),
            encrypted_key: data_key.encrypted_key.clone(),
            plaintext_key: data_key.plaintext_key,
        });

        info!(key_id = %data_key.key_id, "Generated new data key");
        Ok(EncryptionKey {
            crypto_key,
            encrypted_key: data_key.encrypted_key,
        })
    }

    /// Resolve the key for decrypting files wrapped under `encrypted_key`
    #[instrument(skip(self, encrypted_key))]
    pub async fn get_crypto_key_for_decryption(
        &self,
        user_id: &str,
        encrypted_key: &str,
    ) -> Result<CryptoKeyHandle> {
        if let Some(key) = self.slot.matching(user_id, encrypted_key) {
            return Ok(key);
        }

        let decryption_slot = decryption_storage_key(encrypted_key);
        let _flight = self
            .flights
            .acquire(&decrypt_flight(user_id, &decryption_slot))
            .await;

        if let Some(key) = self.slot.matching(user_id, encrypted_key) {
            return Ok(key);
        }

        if let Some(cached_key) = self.storage.get(&decryption_slot).await? {
            match self.import_cached(&cached_key) {
                Ok((crypto_key, _)) => {
                    debug!("Decryption key restored from session storage");
                    return Ok(crypto_key);
                }
                Err(e) => {
                    warn!(error = %e, "Cached decryption key failed to import, evicting");
                    self.storage.remove(&decryption_slot).await?;
                }
            }
        }

        if let Some(crypto_key) = self
            .reuse_active_key(user_id, encrypted_key, &decryption_slot)
            .await?
        {
            return Ok(crypto_key);
        }

        let data_key = self.kms.decrypt_data_key(user_id, encrypted_key).await?;
        let crypto_key = self.engine.import_key(data_key.plaintext_key.as_bytes())?;
        self.storage
            .set(&decryption_slot, &data_key.plaintext_key.to_base64())
            .await?;

        info!(key_id = %data_key.key_id, "Unwrapped data key");
        Ok(crypto_key)
    }

    /// Remove every cached key, durable and in memory
    #[instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<()> {
        let mut removed = 0usize;
        for key in self.storage.keys().await? {
            if CACHE_KEY_PREFIXES.iter().any(|p| key.starts_with(p)) {
                self.storage.remove(&key).await?;
                removed += 1;
            }
        }
        self.slot.clear();

        info!(removed, "Cleared encryption key cache");
        Ok(())
    }

    /// If `encrypted_key` is the user's active wrapped key, reuse its
    /// plaintext instead of asking the KMS.
    ///
    /// Holds the user's encryption flight so the active pair cannot be
    /// replaced between reading the wrapped key and reading its plaintext.
    async fn reuse_active_key(
        &self,
        user_id: &str,
        encrypted_key: &str,
        decryption_slot: &str,
    ) -> Result<Option<CryptoKeyHandle>> {
        let _active = self.flights.acquire(&encrypt_flight(user_id)).await;

        let encrypted_slot = encrypted_key_storage_key(user_id);
        if self.storage.get(&encrypted_slot).await?.as_deref() != Some(encrypted_key) {
            return Ok(None);
        }

        let plaintext_slot = encryption_key_storage_key(user_id);
        let Some(cached_key) = self.storage.get(&plaintext_slot).await? else {
            return Ok(None);
        };

        // clear_cache takes no flight; the pair may have been dropped and
        // reissued by another cache sharing this storage
        if self.storage.get(&encrypted_slot).await?.as_deref() != Some(encrypted_key) {
            debug!("Active key changed during lookup, falling back to the KMS");
            return Ok(None);
        }

        match self.import_cached(&cached_key) {
            Ok((crypto_key, plaintext_key)) => {
                debug!("Decrypting with the user's active key");
                self.storage.set(decryption_slot, &cached_key).await?;
                if self.slot.is_free_for(user_id) {
                    self.slot.set(ActiveKey {
                        user_id: user_id.to_string(),
                        crypto_key: crypto_key.clone(),
                        encrypted_key: encrypted_key.to_string(),
                        plaintext_key,
                    });
                }
                Ok(Some(crypto_key))
            }
            Err(e) => {
                warn!(error = %e, "Cached active key failed to import, evicting");
                self.storage.remove(&plaintext_slot).await?;
                self.storage.remove(&encrypted_slot).await?;
                if self.slot.user_id().as_deref() == Some(user_id) {
                    self.slot.clear();
                }
                Ok(None)
            }
        }
    }

    fn import_cached(
        &self,
        encoded: &str,
    ) -> std::result::Result<(CryptoKeyHandle, RawKey), CryptoError> {
        let raw = RawKey::from_base64(encoded)?;
        let handle = self.engine.import_key(raw.as_bytes())?;
        Ok((handle, raw))
    }
}
