//! HTTP loader for JSON documents
//!
//! [`JsonFetcher`] turns a URL into a loader closure suitable for
//! [`SwrCache::get`](crate::cache::SwrCache::get).

use std::future::Future;
use std::pin::Pin;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when fetching a JSON document
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server returned {0}")]
    Status(StatusCode),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Fetches and decodes JSON over HTTP
#[derive(Debug, Clone, Default)]
pub struct JsonFetcher {
    client: Client,
}

impl JsonFetcher {
    /// Create a new JsonFetcher with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new JsonFetcher with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// GETs `url` and decodes the body as `T`
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        debug!(url, "fetching");
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Builds a cache loader that fetches `url` when invoked
    pub fn loader<T>(
        &self,
        url: impl Into<String>,
    ) -> impl FnOnce() -> Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        let fetcher = self.clone();
        let url = url.into();
        move || Box::pin(async move { fetcher.fetch::<T>(&url).await })
    }
}
