//! Session key storage
//!
//! The durable cache tier is anything implementing [`KeyStorage`]: a flat
//! string-to-string store scoped to one session. Values are base64 key
//! bytes. Two backends ship here: [`MemoryKeyStorage`] for tests and
//! embedders with their own session handling, and [`SessionFileStorage`],
//! which survives process restarts until the session is destroyed.

use crate::{ClientError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Prefix for a user's active plaintext key
pub const ENCRYPTION_KEY_PREFIX: &str = "encryption_key_";

/// Prefix for a user's active wrapped key
pub const ENCRYPTED_KEY_PREFIX: &str = "encrypted_key_";

/// Prefix for unwrapped decryption keys
pub const DECRYPTION_KEY_PREFIX: &str = "decryption_key_";

/// Every prefix owned by the key cache
pub const CACHE_KEY_PREFIXES: [&str; 3] = [
    ENCRYPTION_KEY_PREFIX,
    ENCRYPTED_KEY_PREFIX,
    DECRYPTION_KEY_PREFIX,
];

/// Storage key for a user's active plaintext key
pub fn encryption_key_storage_key(user_id: &str) -> String {
    format!("{}{}", ENCRYPTION_KEY_PREFIX, user_id)
}

/// Storage key for a user's active wrapped key
pub fn encrypted_key_storage_key(user_id: &str) -> String {
    format!("{}{}", ENCRYPTED_KEY_PREFIX, user_id)
}

/// Storage key for the plaintext of a wrapped key.
///
/// Keyed by the SHA-256 of the whole wrapped key so that distinct wrapped
/// keys never share an entry.
pub fn decryption_storage_key(encrypted_key: &str) -> String {
    let digest = Sha256::digest(encrypted_key.as_bytes());
    format!("{}{}", DECRYPTION_KEY_PREFIX, hex::encode(digest))
}

/// Get/set/remove by string key, scoped to one session
#[async_trait]
pub trait KeyStorage: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<()>;

    /// List every stored key
    async fn keys(&self) -> Result<Vec<String>>;
}

/// In-memory key storage
#[derive(Clone, Default)]
pub struct MemoryKeyStorage {
    entries: Arc<DashMap<String, String>>,
}

impl MemoryKeyStorage {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyStorage for MemoryKeyStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }
}

/// Session storage persisted to a single JSON file.
///
/// The file holds plaintext key material, so it is written owner-only and
/// should live somewhere that is cleaned up with the session. Call
/// [`SessionFileStorage::destroy`] when the session ends.
pub struct SessionFileStorage {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl SessionFileStorage {
    /// Open (or start) a session file.
    ///
    /// A missing parent directory is created owner-only. A corrupt file is
    /// treated as an empty session.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut dir = tokio::fs::DirBuilder::new();
        dir.recursive(true);
        #[cfg(unix)]
        dir.mode(0o700);
        dir.create(session_dir(&path)).await?;

        let entries = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Discarding corrupt session file");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(ClientError::Io(e)),
        };

        debug!(path = %path.display(), "Opened session key storage");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// End the session: forget every entry and delete the file
    pub async fn destroy(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Io(e)),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let json = serde_json::to_vec(entries)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_private(&path, &json))
            .await
            .map_err(|e| ClientError::Storage(format!("session write task failed: {}", e)))?
    }
}

/// Replace `path` with `contents` through a fresh owner-only temp file in
/// the same directory. Nothing pre-existing is ever written into.
fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = session_dir(path);
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| ClientError::Storage(format!("{}: {}", dir.display(), e)))?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| ClientError::Io(e.error))?;
    Ok(())
}

fn session_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

#[async_trait]
impl KeyStorage for SessionFileStorage {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.lock().await.keys().cloned().collect())
    }
}
