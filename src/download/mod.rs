//! Download lifecycle and streaming transfer machinery.
//!
//! This module provides the [`Download`] handle with its state machine
//! (start/stop/pause/resume), the [`HttpClient`] wrapper used to issue
//! streaming GET requests, and the [`RetryPolicy`] governing how transfer
//! failures are retried.
//!
//! Handles are created through [`crate::DownloadRegistry`]; the types here
//! cover everything that happens after registration.

mod client;
mod error;
mod retry;
mod status;
mod task;

pub use client::{HttpClient, HttpClientConfig};
pub use error::DownloadError;
pub use retry::{Backoff, DEFAULT_MAX_RETRIES, RetryPolicy};
pub use status::DownloadStatus;
pub use task::Download;

// Note: no module-local Result alias. Use `Result<T, DownloadError>`
// explicitly in function signatures.
