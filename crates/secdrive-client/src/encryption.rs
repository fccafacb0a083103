//! Client-side encryption support
//!
//! [`EncryptedClient`] is the entry point for applications. Files are
//! encrypted under the user's active data key before they leave the
//! process, and only the wrapped form of that key is sent to the server.
//!
//! ## Upload
//!
//! 1. Resolve the active key through the [`KeyCache`]
//! 2. Encrypt and frame as `iv || ciphertext`
//! 3. `POST /generatePresignedUrl` for a storage URL
//! 4. `PUT` the blob to that URL
//! 5. `POST /confirmUpload` with the wrapped key
//!
//! ## Download
//!
//! Resolve the wrapped key stored with the file through the cache, then run
//! the [`DownloadDecryptPipeline`].
//!
//! ## Delete
//!
//! `POST /deleteFile` removes the stored blob and its record. The server
//! checks ownership; keys are untouched.

use crate::{
    types::{
        ConfirmUploadRequest, ConfirmUploadResponse, DeleteFileRequest, DeleteFileResponse,
        PresignedUpload, PresignedUploadRequest,
    },
    ApiClient, ClientError, Config, DownloadDecryptPipeline, HttpKmsClient, KeyCache,
    KeyManagementClient, KeyStorage, Result, SaveSink, UploadReceipt,
};
use bytes::Bytes;
use secdrive_crypto::FileCryptoEngine;
use std::sync::Arc;
use tracing::{info, instrument};

/// Path of the presigned upload URL route
pub const PRESIGNED_URL_PATH: &str = "/generatePresignedUrl";

/// Path of the upload confirmation route
pub const CONFIRM_UPLOAD_PATH: &str = "/confirmUpload";

/// Path of the file deletion route
pub const DELETE_FILE_PATH: &str = "/deleteFile";

/// Content type used when the caller does not supply one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// An encrypted file ready to be stored
#[derive(Clone, Debug)]
pub struct EncryptedFile {
    /// Framed blob, `iv || ciphertext`
    pub blob: Bytes,
    /// Wrapped data key the blob was encrypted under
    pub encrypted_key: String,
}

/// Client with transparent envelope encryption
pub struct EncryptedClient {
    api: ApiClient,
    cache: KeyCache,
    engine: FileCryptoEngine,
    pipeline: DownloadDecryptPipeline,
}

impl EncryptedClient {
    /// Create a client talking to the HTTP KMS at `config.endpoint`
    pub fn new(config: Config, storage: Arc<dyn KeyStorage>) -> Result<Self> {
        let api = ApiClient::new(config)?;
        let kms = Arc::new(HttpKmsClient::new(api.clone()));
        Ok(Self::with_parts(api, kms, storage, FileCryptoEngine::default()))
    }

    /// Create a client from explicit parts
    pub fn with_parts(
        api: ApiClient,
        kms: Arc<dyn KeyManagementClient>,
        storage: Arc<dyn KeyStorage>,
        engine: FileCryptoEngine,
    ) -> Self {
        let cache = KeyCache::new(kms, storage).with_engine(engine.clone());
        Self::with_cache(api, cache, engine)
    }

    /// Create a client around an existing cache
    pub fn with_cache(api: ApiClient, cache: KeyCache, engine: FileCryptoEngine) -> Self {
        let pipeline = DownloadDecryptPipeline::new(api.clone(), engine.clone());
        Self {
            api,
            cache,
            engine,
            pipeline,
        }
    }

    /// Get the key cache
    pub fn cache(&self) -> &KeyCache {
        &self.cache
    }

    /// Get the underlying API client
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Encrypt a file under the user's active key
    #[instrument(skip(self, plaintext), fields(size = plaintext.len()))]
    pub async fn encrypt_file(&self, user_id: &str, plaintext: &[u8]) -> Result<EncryptedFile> {
        let key = self.cache.get_crypto_key(user_id).await?;
        let blob = self.engine.seal(plaintext, &key.crypto_key)?;
        Ok(EncryptedFile {
            blob,
            encrypted_key: key.encrypted_key,
        })
    }

    /// Decrypt a framed blob encrypted under `encrypted_key`
    #[instrument(skip(self, encrypted_key, blob), fields(size = blob.len()))]
    pub async fn decrypt_file(
        &self,
        user_id: &str,
        encrypted_key: &str,
        blob: &[u8],
    ) -> Result<Bytes> {
        let key = self
            .cache
            .get_crypto_key_for_decryption(user_id, encrypted_key)
            .await?;
        Ok(Bytes::from(self.engine.open(blob, &key)?))
    }

    /// Encrypt and upload a file, returning where it landed
    #[instrument(skip(self, plaintext, content_type), fields(size = plaintext.len()))]
    pub async fn upload_file(
        &self,
        user_id: &str,
        file_name: &str,
        plaintext: &[u8],
        content_type: Option<&str>,
    ) -> Result<UploadReceipt> {
        let content_type = content_type.unwrap_or(DEFAULT_CONTENT_TYPE).to_string();
        let file = self.encrypt_file(user_id, plaintext).await?;
        let file_size = file.blob.len() as u64;

        let presigned: PresignedUpload = self
            .api
            .post_json(
                PRESIGNED_URL_PATH,
                &PresignedUploadRequest {
                    user_id: user_id.to_string(),
                    file_name: file_name.to_string(),
                    file_size,
                    content_type: content_type.clone(),
                },
            )
            .await
            .map_err(|e| upload_step_failed("presign", e))?;

        self.api
            .put_bytes(&presigned.presigned_url, &content_type, file.blob)
            .await?;

        let confirmed: ConfirmUploadResponse = self
            .api
            .post_json(
                CONFIRM_UPLOAD_PATH,
                &ConfirmUploadRequest {
                    file_id: presigned.file_id.clone(),
                    user_id: user_id.to_string(),
                    file_name: file_name.to_string(),
                    file_size,
                    s3_key: presigned.s3_key.clone(),
                    content_type,
                    encrypted_key: file.encrypted_key.clone(),
                },
            )
            .await
            .map_err(|e| upload_step_failed("confirm", e))?;

        info!(file_id = %confirmed.file_id, file_size, "Uploaded encrypted file");
        Ok(UploadReceipt {
            file_id: confirmed.file_id,
            s3_key: presigned.s3_key,
            encrypted_key: file.encrypted_key,
            blob_size: file_size,
        })
    }

    /// Download, decrypt and save a file
    #[instrument(skip(self, encrypted_key, sink))]
    pub async fn download_file(
        &self,
        user_id: &str,
        url: &str,
        file_name: &str,
        encrypted_key: &str,
        sink: &dyn SaveSink,
    ) -> Result<()> {
        let key = self
            .cache
            .get_crypto_key_for_decryption(user_id, encrypted_key)
            .await?;
        self.pipeline
            .download_and_decrypt(url, file_name, &key, sink)
            .await
    }

    /// Download and decrypt a file into memory
    #[instrument(skip(self, encrypted_key))]
    pub async fn fetch_file(&self, user_id: &str, url: &str, encrypted_key: &str) -> Result<Bytes> {
        let key = self
            .cache
            .get_crypto_key_for_decryption(user_id, encrypted_key)
            .await?;
        self.pipeline.fetch_and_decrypt(url, &key).await
    }

    /// Delete an uploaded file owned by `user_id`
    #[instrument(skip(self))]
    pub async fn delete_file(&self, user_id: &str, file_id: &str) -> Result<DeleteFileResponse> {
        let deleted: DeleteFileResponse = self
            .api
            .post_json(
                DELETE_FILE_PATH,
                &DeleteFileRequest {
                    file_id: file_id.to_string(),
                    user_id: user_id.to_string(),
                },
            )
            .await
            .map_err(|e| match e {
                ClientError::Api { status, message } => ClientError::DeleteFailed { status, message },
                other => other,
            })?;

        info!(file_id = %deleted.file_id, "Deleted file");
        Ok(deleted)
    }

    /// Forget every cached key
    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.clear_cache().await
    }
}

fn upload_step_failed(step: &str, err: ClientError) -> ClientError {
    match err {
        ClientError::Api { status, message } => {
            ClientError::UploadFailed(format!("{} ({}): {}", step, status, message))
        }
        other => other,
    }
}
