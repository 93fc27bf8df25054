//! HTTP client wrapper for issuing streaming download requests.
//!
//! This module provides the [`HttpClient`] struct which owns a pooled
//! `reqwest::Client` with explicit timeout configuration, and maps transport
//! failures into [`DownloadError`] values the retry loop understands.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use super::error::DownloadError;

/// Default HTTP connect timeout (30 seconds).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default total request timeout (5 minutes for large files).
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Default User-Agent identifying the library.
const DEFAULT_USER_AGENT: &str = concat!("downpour/", env!("CARGO_PKG_VERSION"));

/// Configuration for constructing an [`HttpClient`].
///
/// All timeouts are delegated to the underlying HTTP client; the transfer
/// loop itself imposes none of its own.
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// Timeout for the whole request, from connect to the last body byte.
    pub request_timeout: Duration,
    /// User-Agent header sent with every request.
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// HTTP client for downloading files with streaming support.
///
/// This client is designed to be created once and shared by every download
/// in a registry, taking advantage of connection pooling. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Request timeout: 5 minutes (for large files)
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_config(&HttpClientConfig::default())
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a new HTTP client from an explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns the underlying builder error if the client cannot be
    /// constructed (e.g. the TLS backend fails to initialize).
    pub fn with_config(config: &HttpClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .gzip(true)
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    /// Issues a GET request and validates the response status.
    ///
    /// The returned response has a success status; its body has not been
    /// consumed, so the caller can stream it chunk by chunk.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Timeout`] if the request times out,
    /// [`DownloadError::Network`] for transport failures, and
    /// [`DownloadError::HttpStatus`] for non-success response codes.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, DownloadError> {
        debug!(url, "issuing GET request");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(url)
            } else {
                DownloadError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    ///
    /// This can be used for advanced operations not covered by this wrapper.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = HttpClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(300));
        assert!(config.user_agent.starts_with("downpour/"));
    }

    #[test]
    fn test_with_config_builds() {
        let config = HttpClientConfig {
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(60),
            user_agent: "downpour-test".to_string(),
        };
        assert!(HttpClient::with_config(&config).is_ok());
    }
}
