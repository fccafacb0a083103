//! Key management service client
//!
//! Two remote calls: issue a new data key for a user, or unwrap a data key
//! the KMS issued earlier. Neither call retries; the cache decides what to
//! do on failure. Whatever goes wrong (transport, status, body), callers see
//! only [`ClientError::KmsUnavailable`] and the cause goes to the log.

use crate::{
    types::{
        DataKey, DecryptDataKeyRequest, DecryptDataKeyResponse, DecryptedDataKey,
        GenerateDataKeyRequest, GenerateDataKeyResponse,
    },
    ApiClient, ClientError, KmsOperation, Result,
};
use async_trait::async_trait;
use secdrive_crypto::RawKey;
use tracing::{error, instrument};

/// Path of the data key generation route
pub const GENERATE_DATA_KEY_PATH: &str = "/generateDataKey";

/// Path of the data key decryption route
pub const DECRYPT_DATA_KEY_PATH: &str = "/decryptDataKey";

/// Remote boundary to the KMS
#[async_trait]
pub trait KeyManagementClient: Send + Sync {
    /// Request a new data key for a user
    async fn generate_data_key(&self, user_id: &str) -> Result<DataKey>;

    /// Unwrap a previously issued data key
    async fn decrypt_data_key(&self, user_id: &str, encrypted_key: &str)
        -> Result<DecryptedDataKey>;
}

/// KMS client over the SecDrive HTTP API
#[derive(Clone)]
pub struct HttpKmsClient {
    api: ApiClient,
}

impl HttpKmsClient {
    /// Create a KMS client sharing the given API client
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    async fn try_generate(&self, user_id: &str) -> Result<DataKey> {
        let response: GenerateDataKeyResponse = self
            .api
            .post_json(GENERATE_DATA_KEY_PATH, &GenerateDataKeyRequest { user_id })
            .await?;

        Ok(DataKey {
            key_id: response.key_id,
            plaintext_key: RawKey::from_base64(&response.plaintext_key)?,
            encrypted_key: response.encrypted_key,
        })
    }

    async fn try_decrypt(&self, user_id: &str, encrypted_key: &str) -> Result<DecryptedDataKey> {
        let response: DecryptDataKeyResponse = self
            .api
            .post_json(
                DECRYPT_DATA_KEY_PATH,
                &DecryptDataKeyRequest {
                    user_id,
                    encrypted_key,
                },
            )
            .await?;

        Ok(DecryptedDataKey {
            key_id: response.key_id,
            plaintext_key: RawKey::from_base64(&response.plaintext_key)?,
        })
    }
}

#[async_trait]
impl KeyManagementClient for HttpKmsClient {
    #[instrument(skip(self))]
    async fn generate_data_key(&self, user_id: &str) -> Result<DataKey> {
        self.try_generate(user_id).await.map_err(|e| {
            error!(error = %e, "Failed to generate data key");
            ClientError::KmsUnavailable(KmsOperation::GenerateDataKey)
        })
    }

    #[instrument(skip(self, encrypted_key))]
    async fn decrypt_data_key(
        &self,
        user_id: &str,
        encrypted_key: &str,
    ) -> Result<DecryptedDataKey> {
        self.try_decrypt(user_id, encrypted_key).await.map_err(|e| {
            error!(error = %e, "Failed to decrypt data key");
            ClientError::KmsUnavailable(KmsOperation::DecryptDataKey)
        })
    }
}
