//! Download and decrypt
//!
//! Fetch the framed blob, split off the IV, verify and decrypt, then hand
//! the plaintext to a [`SaveSink`]. Nothing reaches the sink unless the
//! GCM tag verified.

use crate::{ApiClient, ClientError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use secdrive_crypto::{unpack, CryptoKeyHandle, FileCryptoEngine};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, instrument};

/// Destination for decrypted files
#[async_trait]
pub trait SaveSink: Send + Sync {
    /// Persist or deliver a decrypted file
    async fn save(&self, file_name: &str, contents: Bytes) -> Result<()>;
}

/// Saves decrypted files into a directory
#[derive(Clone, Debug)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    /// Create a sink saving into `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory files are saved into
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a file name inside the root. Names with separators, parent
    /// components or absolute paths are rejected.
    fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        let name = Path::new(file_name);
        let mut components = name.components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => Ok(self.root.join(part)),
            _ => Err(ClientError::Storage(format!(
                "refusing to save outside {}: {:?}",
                self.root.display(),
                file_name
            ))),
        }
    }
}

#[async_trait]
impl SaveSink for DirectorySink {
    async fn save(&self, file_name: &str, contents: Bytes) -> Result<()> {
        let path = self.resolve(file_name)?;
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(&path, &contents).await?;
        debug!(path = %path.display(), size = contents.len(), "Saved decrypted file");
        Ok(())
    }
}

/// Fetch → unpack → decrypt → save
#[derive(Clone)]
pub struct DownloadDecryptPipeline {
    api: ApiClient,
    engine: FileCryptoEngine,
}

impl DownloadDecryptPipeline {
    pub fn new(api: ApiClient, engine: FileCryptoEngine) -> Self {
        Self { api, engine }
    }

    /// Fetch `url` and return the decrypted contents
    #[instrument(skip(self, key))]
    pub async fn fetch_and_decrypt(&self, url: &str, key: &CryptoKeyHandle) -> Result<Bytes> {
        let blob = self.api.get_bytes(url).await?;
        let (iv, ciphertext) = unpack(&blob)?;
        let plaintext = self.engine.decrypt(ciphertext, key, &iv)?;
        Ok(Bytes::from(plaintext))
    }

    /// Fetch `url`, decrypt it and save the plaintext as `file_name`
    #[instrument(skip(self, key, sink))]
    pub async fn download_and_decrypt(
        &self,
        url: &str,
        file_name: &str,
        key: &CryptoKeyHandle,
        sink: &dyn SaveSink,
    ) -> Result<()> {
        let plaintext = self.fetch_and_decrypt(url, key).await?;
        let size = plaintext.len();
        sink.save(file_name, plaintext).await?;
        info!(size, "Downloaded and decrypted file");
        Ok(())
    }
}
