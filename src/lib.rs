//! Downpour
//!
//! A fully asynchronous HTTP(S) file downloader. A [`DownloadRegistry`] hands
//! out [`Download`] handles bound to a URL and destination path; each handle
//! drives its own streaming transfer on the Tokio runtime with cooperative
//! pause/stop, automatic retries, and per-download progress counters.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Download lifecycle, HTTP client wrapper, retry policy
//! - [`registry`] - Identifier allocation and ownership of download handles
//!
//! # Example
//!
//! ```no_run
//! use downpour::{DownloadRegistry, RetryPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = DownloadRegistry::new();
//! let download = registry.add(
//!     "https://example.com/archive.zip",
//!     "./downloads/archive.zip",
//!     RetryPolicy::default(),
//! )?;
//!
//! download.start().await?;
//! download.wait().await;
//! println!("{}: {} bytes", download.status(), download.bytes_downloaded());
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod registry;

// Re-export commonly used types
pub use download::{
    Backoff, DEFAULT_MAX_RETRIES, Download, DownloadError, DownloadStatus, HttpClient,
    HttpClientConfig, RetryPolicy,
};
pub use registry::{DownloadId, DownloadRegistry, RegistryError};
