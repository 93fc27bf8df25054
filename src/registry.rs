//! Identifier allocation and ownership of download handles.
//!
//! The [`DownloadRegistry`] owns every [`Download`] it creates, keyed by a
//! process-unique [`DownloadId`] and enumerable in insertion order. Removing
//! an entry only detaches it from the registry; it never cancels an
//! in-flight transfer (callers stop the download first), and handles held
//! elsewhere stay valid.

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info, instrument};
use url::Url;

use crate::download::{Download, HttpClient, RetryPolicy};

/// Opaque identifier for a registered download.
///
/// Assigned by the registry at creation time, monotonically increasing, and
/// unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DownloadId(u64);

impl DownloadId {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the numeric value of the identifier.
    #[must_use]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from registry bookkeeping operations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// Lookup or removal by an identifier the registry does not know.
    #[error("no download registered with id {id}")]
    NotFound {
        /// The identifier that was requested.
        id: DownloadId,
    },

    /// The URL handed to `add` was rejected.
    #[error("invalid download URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL that failed validation.
        url: String,
        /// Why the URL is invalid.
        reason: String,
    },
}

impl RegistryError {
    /// Creates a `NotFound` error for an unknown identifier.
    #[must_use]
    pub fn not_found(id: DownloadId) -> Self {
        Self::NotFound { id }
    }

    /// Creates an `InvalidUrl` error for an empty URL.
    #[must_use]
    pub fn empty_url() -> Self {
        Self::InvalidUrl {
            url: String::new(),
            reason: "URL is empty".to_string(),
        }
    }

    /// Creates an `InvalidUrl` error for a non-web URL scheme.
    #[must_use]
    pub fn unsupported_scheme(url: &str, scheme: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: format!("scheme '{scheme}' is not supported; use http:// or https://"),
        }
    }

    /// Creates an `InvalidUrl` error for a malformed URL.
    #[must_use]
    pub fn malformed(url: &str, parse_error: &str) -> Self {
        Self::InvalidUrl {
            url: url.to_string(),
            reason: parse_error.to_string(),
        }
    }
}

/// The owning collection of downloads for a process.
///
/// All downloads created through one registry share its HTTP client (and
/// thus its connection pool). The mapping is guarded by a single lock and is
/// safe to use from concurrent tasks; download transfer loops never touch
/// the mapping.
pub struct DownloadRegistry {
    client: HttpClient,
    next_id: AtomicU64,
    downloads: RwLock<IndexMap<DownloadId, Download>>,
}

impl DownloadRegistry {
    /// Creates a registry with a default [`HttpClient`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(HttpClient::new())
    }

    /// Creates a registry whose downloads share the given client.
    #[must_use]
    pub fn with_client(client: HttpClient) -> Self {
        Self {
            client,
            next_id: AtomicU64::new(1),
            downloads: RwLock::new(IndexMap::new()),
        }
    }

    /// Registers a new download for `url`, saving to `path`.
    ///
    /// The download is created in `Pending` state; nothing is transferred
    /// until [`Download::start`] is called. The destination's parent
    /// directories need not exist yet (the transfer creates them).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidUrl`] if `url` is empty, cannot be
    /// parsed, or does not use the http or https scheme.
    #[instrument(skip(self, path, policy), fields(url = %url))]
    pub fn add(
        &self,
        url: &str,
        path: impl Into<PathBuf>,
        policy: RetryPolicy,
    ) -> Result<Download, RegistryError> {
        let parsed = validate_url(url)?;
        let id = DownloadId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let download = Download::new(id, parsed, path.into(), self.client.clone(), policy);

        self.downloads_write().insert(id, download.clone());
        info!(%id, path = %download.path().display(), "download registered");
        Ok(download)
    }

    /// Looks up a download by identifier.
    #[must_use]
    pub fn get(&self, id: DownloadId) -> Option<Download> {
        self.downloads_read().get(&id).cloned()
    }

    /// Detaches a download from the registry and returns its handle.
    ///
    /// An active transfer keeps running; callers who want it gone should
    /// call [`Download::stop`] first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the identifier is unknown.
    #[instrument(skip(self))]
    pub fn remove(&self, id: DownloadId) -> Result<Download, RegistryError> {
        // shift_remove keeps the enumeration order of the remaining entries.
        let removed = self
            .downloads_write()
            .shift_remove(&id)
            .ok_or_else(|| RegistryError::not_found(id))?;
        debug!(%id, "download removed from registry");
        Ok(removed)
    }

    /// Returns a snapshot of all download handles in insertion order.
    ///
    /// Later mutation of the registry does not affect an already-taken
    /// snapshot.
    #[must_use]
    pub fn all(&self) -> Vec<Download> {
        self.downloads_read().values().cloned().collect()
    }

    /// Returns the number of registered downloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.downloads_read().len()
    }

    /// Returns true if no downloads are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.downloads_read().is_empty()
    }

    /// Returns true while any registered download is actively transferring.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.downloads_read()
            .values()
            .any(|download| download.status().is_active())
    }

    /// Starts every registered download whose state permits it.
    ///
    /// Downloads that are already running (or paused) are skipped rather
    /// than failing the whole sweep.
    pub async fn start_all(&self) {
        for download in self.all() {
            if let Err(error) = download.start().await {
                debug!(id = %download.id(), %error, "skipping download in start_all");
            }
        }
    }

    /// Requests cancellation of every active or paused download.
    pub fn stop_all(&self) {
        for download in self.all() {
            if let Err(error) = download.stop() {
                debug!(id = %download.id(), %error, "skipping download in stop_all");
            }
        }
    }

    fn downloads_read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<DownloadId, Download>> {
        self.downloads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn downloads_write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<DownloadId, Download>> {
        self.downloads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DownloadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DownloadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<DownloadId> = self.downloads_read().keys().copied().collect();
        f.debug_struct("DownloadRegistry")
            .field("download_count", &ids.len())
            .field("ids", &ids)
            .finish()
    }
}

fn validate_url(url: &str) -> Result<Url, RegistryError> {
    if url.trim().is_empty() {
        return Err(RegistryError::empty_url());
    }

    let parsed = Url::parse(url).map_err(|e| RegistryError::malformed(url, &e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(RegistryError::unsupported_scheme(url, scheme)),
    }
}
