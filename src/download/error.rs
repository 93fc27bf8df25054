//! Error types for the download module.
//!
//! Structured errors for everything that can go wrong while controlling or
//! running a transfer. Lifecycle violations surface immediately to the
//! caller; transfer-level failures are consumed by the retry loop and only
//! recorded on the download once retries are exhausted.

use std::path::PathBuf;

use thiserror::Error;

use super::status::DownloadStatus;

/// Errors that can occur while controlling or running a download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The requested operation is not permitted in the current lifecycle state.
    #[error("cannot {operation} a download that is {status}")]
    InvalidState {
        /// The operation that was attempted (e.g. `"start"`, `"resume"`).
        operation: &'static str,
        /// The status the download was in at the time.
        status: DownloadStatus,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors,
    /// or a failure mid-stream).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error during download (create file, write, flush).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates an invalid-state error for a rejected lifecycle operation.
    pub(crate) fn invalid_state(operation: &'static str, status: DownloadStatus) -> Self {
        Self::InvalidState { operation, status }
    }

    /// Creates a network error from a reqwest error.
    pub(crate) fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub(crate) fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub(crate) fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for failures the retry loop may try again (everything
    /// except lifecycle violations).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidState { .. })
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<reqwest::Error>` or
// `From<std::io::Error>` because our error variants require context (url,
// path) that the source errors don't provide. The helper constructors are
// the correct pattern here as they allow callers to provide that context.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_state_display() {
        let error = DownloadError::invalid_state("resume", DownloadStatus::Pending);
        let msg = error.to_string();
        assert!(msg.contains("resume"), "Expected operation in: {msg}");
        assert!(msg.contains("pending"), "Expected status in: {msg}");
    }

    #[test]
    fn test_timeout_display() {
        let error = DownloadError::timeout("https://example.com/file.zip");
        let msg = error.to_string();
        assert!(msg.contains("timeout"), "Expected 'timeout' in: {msg}");
        assert!(
            msg.contains("https://example.com/file.zip"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_http_status_display() {
        let error = DownloadError::http_status("https://example.com/file.zip", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://example.com/file.zip"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/out.bin"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/out.bin"), "Expected path in: {msg}");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(DownloadError::timeout("https://example.com").is_retryable());
        assert!(DownloadError::http_status("https://example.com", 500).is_retryable());
        assert!(
            !DownloadError::invalid_state("start", DownloadStatus::Downloading).is_retryable()
        );
    }
}
