//! Blob storage boundary.
//!
//! Audio payloads live in an external object store; the pipeline only ever
//! fetches bytes by their opaque key.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// The reference does not resolve to an object.
    #[error("audio object not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Request(#[from] anyhow::Error),
}

/// Read access to the upload bucket.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch the raw bytes behind a storage key.
    async fn fetch_bytes(&self, input_ref: &str) -> Result<Vec<u8>, StorageError>;
}

/// HTTP client for the object storage gateway.
pub struct HttpBlobStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBlobStore {
    /// Create a new blob store client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the storage gateway (e.g., "http://localhost:9000")
    /// * `timeout_sec` - Request timeout in seconds
    pub fn new(base_url: String, timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        // Ensure base_url doesn't have trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        Self { client, base_url }
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch_bytes(&self, input_ref: &str) -> Result<Vec<u8>, StorageError> {
        let url = format!("{}/object/{}", self.base_url, input_ref);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to connect to storage gateway")?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(input_ref.to_string()));
        }
        if !response.status().is_success() {
            return Err(StorageError::Request(anyhow::anyhow!(
                "Failed to fetch {}: status {}",
                input_ref,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .context("Failed to read object body")?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let store = HttpBlobStore::new("http://localhost:9000/".to_string(), 30);
        assert_eq!(store.base_url, "http://localhost:9000");
    }
}
