//! # SecDrive Crypto
//!
//! Client-side file cryptography for SecDrive.
//!
//! This crate provides:
//! - **File encryption**: AES-256-GCM with a fresh random IV per file
//! - **Blob framing**: `iv || ciphertext`, the wire format for stored files
//! - **Key handles**: non-exportable imported data keys
//! - **Crypto providers**: pluggable randomness and primitive calls
//!
//! ## Security Model
//!
//! Files are encrypted before they leave the client. Data keys come from a
//! remote KMS; only their wrapped form is stored server-side. Once a raw
//! data key is imported into a [`CryptoKeyHandle`] it cannot be read back
//! out through the handle.
//!
//! ## Example
//!
//! ```rust,ignore
//! use secdrive_crypto::FileCryptoEngine;
//!
//! let engine = FileCryptoEngine::default();
//! let key = engine.import_key_base64(&data_key.plaintext_key)?;
//!
//! let blob = engine.seal(b"Hello, World!", &key)?;
//! let plaintext = engine.open(&blob, &key)?;
//! ```

pub mod blob;
pub mod engine;
pub mod error;
pub mod keys;
pub mod provider;

pub use blob::{pack, unpack, EncryptedBlob};
pub use engine::FileCryptoEngine;
pub use error::{CryptoError, Result};
pub use keys::{CryptoKeyHandle, Iv, RawKey, IV_SIZE, KEY_SIZE, TAG_SIZE};
pub use provider::{CryptoProvider, SequentialIvProvider, SystemCryptoProvider};

/// Algorithm identifier for the file encryption scheme
pub const ALGORITHM: &str = "AES-256-GCM";
