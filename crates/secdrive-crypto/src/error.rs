//! Error types for the secdrive-crypto crate

use thiserror::Error;

/// Result type alias using `CryptoError`
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur during cryptographic operations
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Framed buffer is too short to contain an IV
    #[error("malformed blob: {len} bytes is shorter than the {min}-byte IV")]
    MalformedBlob { len: usize, min: usize },

    /// GCM tag verification failed (tampered data, wrong key or wrong IV)
    #[error("authentication failed: ciphertext could not be verified")]
    AuthenticationFailed,

    /// Invalid key format or length
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid IV format or length
    #[error("invalid iv: {0}")]
    InvalidIv(String),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    Encryption(String),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
