//! Client error types

use secdrive_crypto::CryptoError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Which KMS call failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KmsOperation {
    /// `POST /generateDataKey`
    GenerateDataKey,
    /// `POST /decryptDataKey`
    DecryptDataKey,
}

impl std::fmt::Display for KmsOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GenerateDataKey => f.write_str("generate"),
            Self::DecryptDataKey => f.write_str("decrypt"),
        }
    }
}

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// KMS call failed. The underlying cause is logged, not carried.
    #[error("failed to {0} encryption key")]
    KmsUnavailable(KmsOperation),

    /// Cryptographic failure (malformed blob, authentication failure, bad key)
    #[error("Encryption error: {0}")]
    Crypto(#[from] CryptoError),

    /// API returned a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Fetching ciphertext returned a non-success response
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    /// Upload, presign or confirm step failed
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    /// Delete rejected by the API
    #[error("Delete failed ({status}): {message}")]
    DeleteFailed { status: u16, message: String },

    /// Key storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ClientError {
    /// GCM tag verification failed: tampered data or wrong key
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::AuthenticationFailed))
    }

    /// The encrypted buffer was too short to be a blob
    pub fn is_malformed_blob(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::MalformedBlob { .. }))
    }

    /// The API reported the resource missing
    pub fn is_not_found(&self) -> bool {
        matches!(self.api_status(), Some(404))
    }

    /// The API refused access to the resource
    pub fn is_access_denied(&self) -> bool {
        matches!(self.api_status(), Some(403))
    }

    fn api_status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } | Self::DeleteFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// A KMS call failed
    pub fn is_kms_unavailable(&self) -> bool {
        matches!(self, Self::KmsUnavailable(_))
    }
}
