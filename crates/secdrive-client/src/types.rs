//! Common types for the client SDK

use secdrive_crypto::RawKey;
use serde::{Deserialize, Serialize};

/// A data key issued by the KMS
#[derive(Clone, Debug)]
pub struct DataKey {
    /// KMS key identifier the data key was issued under
    pub key_id: String,
    /// Plaintext key bytes; never persisted beyond the session
    pub plaintext_key: RawKey,
    /// Wrapped key (base64), the only form safe to store server-side
    pub encrypted_key: String,
}

/// A wrapped key unwrapped by the KMS
#[derive(Clone, Debug)]
pub struct DecryptedDataKey {
    /// KMS key identifier
    pub key_id: String,
    /// Plaintext key bytes
    pub plaintext_key: RawKey,
}

/// `POST /generateDataKey` request body
#[derive(Serialize)]
pub(crate) struct GenerateDataKeyRequest<'a> {
    pub user_id: &'a str,
}

/// `POST /generateDataKey` response body
#[derive(Deserialize)]
pub(crate) struct GenerateDataKeyResponse {
    pub plaintext_key: String,
    pub encrypted_key: String,
    pub key_id: String,
}

/// `POST /decryptDataKey` request body
#[derive(Serialize)]
pub(crate) struct DecryptDataKeyRequest<'a> {
    pub user_id: &'a str,
    pub encrypted_key: &'a str,
}

/// `POST /decryptDataKey` response body
#[derive(Deserialize)]
pub(crate) struct DecryptDataKeyResponse {
    pub plaintext_key: String,
    pub key_id: String,
}

/// `POST /generatePresignedUrl` request body
#[derive(Clone, Debug, Serialize)]
pub struct PresignedUploadRequest {
    /// Owner of the file
    pub user_id: String,
    /// Original file name
    pub file_name: String,
    /// Size of the encrypted blob in bytes
    pub file_size: u64,
    /// Content type of the upload
    pub content_type: String,
}

/// `POST /generatePresignedUrl` response body
#[derive(Clone, Debug, Deserialize)]
pub struct PresignedUpload {
    /// Short-lived URL accepting a PUT of the blob
    pub presigned_url: String,
    /// Server-assigned file id
    pub file_id: String,
    /// Object key in the storage bucket
    pub s3_key: String,
    /// Storage bucket name
    #[serde(default)]
    pub bucket_name: Option<String>,
}

/// `POST /confirmUpload` request body
#[derive(Clone, Debug, Serialize)]
pub struct ConfirmUploadRequest {
    /// Server-assigned file id
    pub file_id: String,
    /// Owner of the file
    pub user_id: String,
    /// Original file name
    pub file_name: String,
    /// Size of the encrypted blob in bytes
    pub file_size: u64,
    /// Object key in the storage bucket
    pub s3_key: String,
    /// Content type of the upload
    pub content_type: String,
    /// Wrapped data key needed to decrypt the file later
    pub encrypted_key: String,
}

/// `POST /confirmUpload` response body
#[derive(Clone, Debug, Deserialize)]
pub struct ConfirmUploadResponse {
    /// Server message
    #[serde(default)]
    pub message: Option<String>,
    /// Confirmed file id
    pub file_id: String,
}

/// `POST /deleteFile` request body
#[derive(Clone, Debug, Serialize)]
pub struct DeleteFileRequest {
    /// Server-assigned file id
    pub file_id: String,
    /// Owner of the file
    pub user_id: String,
}

/// `POST /deleteFile` response body
#[derive(Clone, Debug, Deserialize)]
pub struct DeleteFileResponse {
    /// Server message
    #[serde(default)]
    pub message: Option<String>,
    /// Deleted file id
    pub file_id: String,
    /// Object key that was removed from the bucket
    #[serde(default)]
    pub s3_key: Option<String>,
}

/// Result of an encrypted upload
#[derive(Clone, Debug)]
pub struct UploadReceipt {
    /// Server-assigned file id
    pub file_id: String,
    /// Object key in the storage bucket
    pub s3_key: String,
    /// Wrapped data key the file was encrypted under
    pub encrypted_key: String,
    /// Size of the uploaded blob in bytes
    pub blob_size: u64,
}
