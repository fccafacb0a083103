//! # SecDrive Client SDK
//!
//! Client-side envelope encryption for SecDrive storage.
//!
//! ## Features
//!
//! - **KMS data keys**: generate and unwrap per-user data keys over HTTPS
//! - **Session key cache**: memory slot plus durable session storage, with
//!   concurrent requests for the same key coalesced into one KMS call
//! - **Encrypted upload**: encrypt, frame, upload via presigned URL, confirm
//! - **Decrypting download**: fetch, unframe, verify and decrypt
//!
//! ## Example
//!
//! ```rust,ignore
//! use secdrive_client::{Config, EncryptedClient, MemoryKeyStorage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = EncryptedClient::new(
//!         Config::new("https://api.example.com").with_token("id-token"),
//!         Arc::new(MemoryKeyStorage::new()),
//!     )?;
//!
//!     // Encrypt and upload
//!     let receipt = client
//!         .upload_file("user-1", "notes.txt", b"Hello, World!", None)
//!         .await?;
//!
//!     // Later: decrypt with the wrapped key stored alongside the file
//!     let file = client.encrypt_file("user-1", b"more data").await?;
//!     let plaintext = client
//!         .decrypt_file("user-1", &file.encrypted_key, &file.blob)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

mod cache;
mod client;
mod config;
mod download;
mod encryption;
mod error;
mod flight;
mod kms;
mod storage;
mod types;

pub use cache::{EncryptionKey, KeyCache, SessionKeySlot};
pub use client::ApiClient;
pub use config::Config;
pub use download::{DirectorySink, DownloadDecryptPipeline, SaveSink};
pub use encryption::{EncryptedClient, EncryptedFile};
pub use error::{ClientError, KmsOperation, Result};
pub use kms::{HttpKmsClient, KeyManagementClient};
pub use storage::{
    decryption_storage_key, encrypted_key_storage_key, encryption_key_storage_key,
    KeyStorage, MemoryKeyStorage, SessionFileStorage, CACHE_KEY_PREFIXES,
};
pub use types::*;

// Re-export crypto types that appear in the public API
pub use secdrive_crypto::{CryptoKeyHandle, CryptoProvider, FileCryptoEngine, RawKey};
