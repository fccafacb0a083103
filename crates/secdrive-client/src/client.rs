//! HTTP API client

use crate::{ClientError, Config, Result};
use bytes::Bytes;
use reqwest::{header, Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

/// Thin HTTP client for the SecDrive API and presigned storage URLs
#[derive(Clone)]
pub struct ApiClient {
    config: Config,
    http: Client,
}

impl ApiClient {
    /// Create a new client with the given configuration
    pub fn new(config: Config) -> Result<Self> {
        let endpoint = url::Url::parse(&config.endpoint)
            .map_err(|e| ClientError::Config(format!("invalid endpoint {}: {}", config.endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ClientError::Config(format!(
                "unsupported endpoint scheme: {}",
                endpoint.scheme()
            )));
        }

        let mut headers = header::HeaderMap::new();
        let user_agent = config
            .user_agent
            .parse()
            .map_err(|_| ClientError::Config(format!("invalid user agent: {}", config.user_agent)))?;
        headers.insert(header::USER_AGENT, user_agent);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self { config, http })
    }

    /// Create with endpoint URL
    pub fn with_endpoint(endpoint: &str) -> Result<Self> {
        Self::new(Config::new(endpoint))
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// POST a JSON body to an API path and decode the JSON response
    #[instrument(skip(self, body))]
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.config.url(path);
        let mut req = self.http.post(&url).json(body);

        if let Some(token) = &self.config.access_token {
            req = req.bearer_auth(token);
        }

        debug!("Sending POST request to {}", url);
        let response = check_status(req.send().await?).await?;
        Ok(response.json().await?)
    }

    /// GET raw bytes from an absolute URL
    #[instrument(skip(self))]
    pub async fn get_bytes(&self, url: &str) -> Result<Bytes> {
        debug!("Downloading {}", url);
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::DownloadFailed(
                status.canonical_reason().unwrap_or(status.as_str()).to_string(),
            ));
        }

        Ok(response.bytes().await?)
    }

    /// PUT raw bytes to an absolute (presigned) URL
    #[instrument(skip(self, body), fields(size = body.len()))]
    pub async fn put_bytes(&self, url: &str, content_type: &str, body: Bytes) -> Result<()> {
        debug!("Uploading to {}", url);
        let response = self
            .http
            .put(url)
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::UploadFailed(format!("{}: {}", status, text)));
        }

        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&text)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or(text);

    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}
