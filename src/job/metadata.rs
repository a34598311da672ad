//! Metadata API client
//!
//! Resolves a share link into the file name, a direct download URL and the
//! file size. The API is called once per job; failures are not retried.

use crate::config::get_metadata_http_timeout_secs;
use crate::utils::sanitize_filename;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors returned by the metadata API client
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The API could not be reached
    #[error("API unreachable: {0}")]
    Unreachable(String),
    /// The API answered with a non-200 status
    #[error("API returned status {0}")]
    Status(u16),
    /// The response body is not valid JSON
    #[error("malformed API response: {0}")]
    Malformed(String),
    /// A required field is missing or has the wrong type
    #[error("API response is missing `{0}`")]
    MissingField(&'static str),
}

/// File information resolved from a share link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    /// File name, safe to use as a single path component
    pub name: String,
    /// Direct download URL
    pub direct_url: String,
    /// Size in bytes
    pub size: u64,
    /// Optional preview image
    pub thumbnail_url: Option<String>,
}

impl FileMetadata {
    /// Build metadata from the API's JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::MissingField` when `file_name`, `proxy_url` or
    /// `size_bytes` is absent or mistyped.
    pub fn from_json(value: &Value) -> Result<Self, MetadataError> {
        let name = value
            .get("file_name")
            .and_then(Value::as_str)
            .ok_or(MetadataError::MissingField("file_name"))?;
        let direct_url = value
            .get("proxy_url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .ok_or(MetadataError::MissingField("proxy_url"))?;
        let size = value
            .get("size_bytes")
            .and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_f64().and_then(whole_bytes))
                    .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
            })
            .ok_or(MetadataError::MissingField("size_bytes"))?;
        let thumbnail_url = value
            .get("thumbnail")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(ToString::to_string);

        Ok(Self {
            name: sanitize_filename(name),
            direct_url: direct_url.to_string(),
            size,
            thumbnail_url,
        })
    }
}

/// Byte count from a JSON float such as `524288000.0`; fractions and negatives are rejected
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::float_cmp)]
fn whole_bytes(value: f64) -> Option<u64> {
    // 2^64 as f64; anything at or above it does not fit
    const LIMIT: f64 = 18_446_744_073_709_551_616.0;
    if value.is_finite() && value >= 0.0 && value < LIMIT && value.fract() == 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

/// Interface for metadata lookups
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Resolve a validated share link
    async fn resolve(&self, source_url: &str) -> Result<FileMetadata, MetadataError>;

    /// Download a thumbnail image to `dest`
    async fn fetch_thumbnail(&self, url: &str, dest: &Path) -> Result<(), MetadataError>;
}

/// Metadata resolver backed by the HTTP API
#[derive(Clone)]
pub struct HttpMetadataResolver {
    client: HttpClient,
    api_base: String,
}

impl HttpMetadataResolver {
    /// Create a resolver for `api_base`, e.g. `https://host/api?url=`.
    ///
    /// Uses `METADATA_HTTP_TIMEOUT_SECS` or the 60s default as request timeout.
    #[must_use]
    pub fn new(api_base: impl Into<String>) -> Self {
        let timeout = Duration::from_secs(get_metadata_http_timeout_secs());
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| HttpClient::new());
        Self {
            client,
            api_base: api_base.into(),
        }
    }

    /// Full request URL for `source_url`
    #[must_use]
    pub fn request_url(&self, source_url: &str) -> String {
        format!("{}{}", self.api_base, urlencoding::encode(source_url))
    }
}

#[async_trait]
impl MetadataResolver for HttpMetadataResolver {
    async fn resolve(&self, source_url: &str) -> Result<FileMetadata, MetadataError> {
        let url = self.request_url(source_url);
        debug!(url = %url, "Requesting file metadata");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| MetadataError::Unreachable(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            warn!(status = %status, "Metadata API returned an error status");
            return Err(MetadataError::Status(status.as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| MetadataError::Malformed(e.to_string()))?;

        FileMetadata::from_json(&body)
    }

    async fn fetch_thumbnail(&self, url: &str, dest: &Path) -> Result<(), MetadataError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MetadataError::Unreachable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(MetadataError::Status(response.status().as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MetadataError::Unreachable(e.to_string()))?;

        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| MetadataError::Unreachable(format!("writing thumbnail: {e}")))
    }
}
