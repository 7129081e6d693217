//! Feature extraction boundary.
//!
//! Decoding, FFT and loudness measurement run in the DSP sidecar; the
//! pipeline hands it raw audio bytes and gets back the fixed feature
//! schema the scoring engine consumes.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use thiserror::Error;

use crate::scoring::FeatureSet;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// The payload was not decodable audio.
    #[error("failed to decode audio: {0}")]
    Decode(String),
    /// Decoding succeeded but feature extraction did not.
    #[error("feature extraction failed: {0}")]
    Extract(String),
}

/// Feature extraction over raw audio bytes. A pure-function collaborator:
/// the same bytes always yield the same feature set.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait FeatureExtractor: Send + Sync {
    async fn extract(&self, input_ref: &str, bytes: Vec<u8>) -> Result<FeatureSet, ExtractError>;
}

/// HTTP client for the DSP sidecar service.
pub struct HttpFeatureExtractor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFeatureExtractor {
    /// Create a new extractor client.
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the DSP sidecar (e.g., "http://localhost:9100")
    /// * `timeout_sec` - Request timeout in seconds; extraction of long
    ///   files can take minutes, so this is typically generous
    pub fn new(base_url: String, timeout_sec: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        let base_url = base_url.trim_end_matches('/').to_string();

        Self { client, base_url }
    }
}

#[async_trait]
impl FeatureExtractor for HttpFeatureExtractor {
    async fn extract(&self, input_ref: &str, bytes: Vec<u8>) -> Result<FeatureSet, ExtractError> {
        let url = format!("{}/v1/features", self.base_url);
        let response = self
            .client
            .post(&url)
            .query(&[("name", input_ref)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .context("Failed to connect to DSP sidecar")
            .map_err(|e| ExtractError::Extract(e.to_string()))?;

        // The sidecar reports undecodable payloads as 422
        if response.status() == reqwest::StatusCode::UNPROCESSABLE_ENTITY {
            let detail = response.text().await.unwrap_or_default();
            return Err(ExtractError::Decode(detail));
        }
        if !response.status().is_success() {
            return Err(ExtractError::Extract(format!(
                "extraction of {} failed with status {}",
                input_ref,
                response.status()
            )));
        }

        response
            .json::<FeatureSet>()
            .await
            .map_err(|e| ExtractError::Extract(format!("invalid feature payload: {}", e)))
    }
}
