//! The [`Download`] handle: lifecycle state, control operations, and the
//! streaming transfer loop.
//!
//! A `Download` is a cheaply cloneable handle over shared state. `start()`
//! and `resume()` spawn a Tokio task that streams the response body to disk;
//! `stop()` and `pause()` set a cooperative cancellation flag the loop
//! observes at each chunk boundary, so cancellation latency is bounded by
//! the time to receive and write one chunk.
//!
//! Transfer failures never propagate to the caller of `start()`; they feed
//! the retry loop and, once retries are exhausted, land in the download's
//! recorded error detail and `Failed` status.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::registry::DownloadId;

use super::client::HttpClient;
use super::error::DownloadError;
use super::retry::RetryPolicy;
use super::status::DownloadStatus;

/// No cancellation requested; the transfer loop keeps running.
const CONTROL_RUN: u8 = 0;
/// Pause requested; the loop exits at the next chunk boundary, resumable.
const CONTROL_PAUSE: u8 = 1;
/// Stop requested; the loop exits at the next chunk boundary, not resumable.
const CONTROL_STOP: u8 = 2;

/// Poll interval for interruptible waits (backoff sleeps).
const CONTROL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A cancellation request observed by the transfer loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Pause,
    Stop,
}

/// Mutable lifecycle state guarded by one lock.
///
/// Control operations and the transfer loop's own transitions all go through
/// [`Lifecycle::advance`], so a cancellation request can never race a
/// transition into an inconsistent state.
#[derive(Debug)]
struct Lifecycle {
    status: DownloadStatus,
    /// Declared content length; `None` until the server reports it.
    total: Option<u64>,
    /// Set on each (re)start; basis for elapsed/speed/ETA.
    started_at: Option<Instant>,
    /// Failure detail, present only after entering `Failed`.
    last_error: Option<String>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            status: DownloadStatus::Pending,
            total: None,
            started_at: None,
            last_error: None,
        }
    }

    /// Transition-validating setter: rejects edges outside the state machine.
    fn advance(
        &mut self,
        operation: &'static str,
        next: DownloadStatus,
    ) -> Result<(), DownloadError> {
        if !self.status.can_transition(next) {
            return Err(DownloadError::invalid_state(operation, self.status));
        }
        self.status = next;
        Ok(())
    }
}

struct DownloadInner {
    id: DownloadId,
    url: Url,
    path: PathBuf,
    client: HttpClient,
    policy: RetryPolicy,
    lifecycle: RwLock<Lifecycle>,
    /// Bytes transferred in the current attempt.
    current: AtomicU64,
    /// Attempts made in the current run.
    attempts: AtomicU32,
    /// Latest cancellation request; read lock-free at chunk boundaries.
    control: AtomicU8,
    /// Join handle of the currently spawned transfer task.
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DownloadInner {
    fn lifecycle_read(&self) -> RwLockReadGuard<'_, Lifecycle> {
        self.lifecycle.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle_write(&self) -> RwLockWriteGuard<'_, Lifecycle> {
        self.lifecycle
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// A single tracked file transfer.
///
/// Handles are created by [`crate::DownloadRegistry::add`] and can be cloned
/// freely; all clones observe the same underlying state. Dropping every
/// handle does not cancel an in-flight transfer.
#[derive(Clone)]
pub struct Download {
    inner: Arc<DownloadInner>,
}

impl Download {
    /// Constructs a Pending download. Only the registry creates these.
    pub(crate) fn new(
        id: DownloadId,
        url: Url,
        path: PathBuf,
        client: HttpClient,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(DownloadInner {
                id,
                url,
                path,
                client,
                policy,
                lifecycle: RwLock::new(Lifecycle::new()),
                current: AtomicU64::new(0),
                attempts: AtomicU32::new(0),
                control: AtomicU8::new(CONTROL_RUN),
                task: tokio::sync::Mutex::new(None),
            }),
        }
    }

    /// Begins the transfer, spawning the streaming loop on the runtime.
    ///
    /// Progress and the outcome are observed through the read accessors (or
    /// [`wait`](Self::wait)); transfer failures are consumed by the retry
    /// loop and never returned here.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidState`] if the download is already
    /// `Downloading`, or if it is `Paused` (paused downloads are resumed,
    /// not restarted).
    #[instrument(skip(self), fields(id = %self.inner.id, url = %self.inner.url))]
    pub async fn start(&self) -> Result<(), DownloadError> {
        self.launch("start", false).await
    }

    /// Resumes a paused download.
    ///
    /// The transfer restarts from byte zero with a fresh request and a
    /// truncating open of the destination file; no range request is made.
    /// The attempt counter and start time reset as for `start()`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidState`] unless the download is
    /// currently `Paused`.
    #[instrument(skip(self), fields(id = %self.inner.id, url = %self.inner.url))]
    pub async fn resume(&self) -> Result<(), DownloadError> {
        self.launch("resume", true).await
    }

    async fn launch(
        &self,
        operation: &'static str,
        only_from_paused: bool,
    ) -> Result<(), DownloadError> {
        {
            let mut lifecycle = self.inner.lifecycle_write();
            let from = lifecycle.status;
            if only_from_paused {
                if from != DownloadStatus::Paused {
                    return Err(DownloadError::invalid_state(operation, from));
                }
            } else if from == DownloadStatus::Paused {
                return Err(DownloadError::invalid_state(operation, from));
            }
            lifecycle.advance(operation, DownloadStatus::Downloading)?;
            lifecycle.total = None;
            lifecycle.started_at = Some(Instant::now());
            lifecycle.last_error = None;
            self.inner.control.store(CONTROL_RUN, Ordering::SeqCst);
        }
        self.inner.attempts.store(0, Ordering::SeqCst);
        self.inner.current.store(0, Ordering::SeqCst);

        info!(id = %self.inner.id, url = %self.inner.url, operation, "transfer starting");

        let task = tokio::spawn(run_transfer(Arc::clone(&self.inner)));
        *self.inner.task.lock().await = Some(task);
        Ok(())
    }

    /// Requests cancellation of the transfer.
    ///
    /// From `Downloading` this is cooperative: the loop observes the request
    /// at the next chunk boundary and transitions to `Stopped`. From `Paused`
    /// the transition happens immediately (no loop is running). The partial
    /// file is left on disk untouched.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidState`] unless the download is
    /// `Downloading` or `Paused`.
    pub fn stop(&self) -> Result<(), DownloadError> {
        let mut lifecycle = self.inner.lifecycle_write();
        match lifecycle.status {
            DownloadStatus::Downloading => {
                self.inner.control.store(CONTROL_STOP, Ordering::SeqCst);
                debug!(id = %self.inner.id, "stop requested");
                Ok(())
            }
            DownloadStatus::Paused => {
                lifecycle.advance("stop", DownloadStatus::Stopped)?;
                info!(id = %self.inner.id, "paused download stopped");
                Ok(())
            }
            status => Err(DownloadError::invalid_state("stop", status)),
        }
    }

    /// Requests a resumable interruption of the transfer.
    ///
    /// Same cooperative mechanism as [`stop`](Self::stop); the loop
    /// transitions to `Paused` at the next chunk boundary and drops the
    /// in-flight request.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidState`] unless the download is
    /// currently `Downloading`.
    pub fn pause(&self) -> Result<(), DownloadError> {
        let lifecycle = self.inner.lifecycle_write();
        if lifecycle.status != DownloadStatus::Downloading {
            return Err(DownloadError::invalid_state("pause", lifecycle.status));
        }
        self.inner.control.store(CONTROL_PAUSE, Ordering::SeqCst);
        debug!(id = %self.inner.id, "pause requested");
        Ok(())
    }

    /// Waits for the currently spawned transfer task to settle.
    ///
    /// Returns immediately if no task is running. A panicked task is logged
    /// and swallowed. Only the first concurrent waiter joins the task; later
    /// callers return once it has been taken.
    pub async fn wait(&self) {
        let task = self.inner.task.lock().await.take();
        if let Some(task) = task {
            if let Err(join_error) = task.await {
                warn!(id = %self.inner.id, error = %join_error, "download task panicked");
            }
        }
    }

    /// Returns the registry-assigned identifier.
    #[must_use]
    pub fn id(&self) -> DownloadId {
        self.inner.id
    }

    /// Returns the source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.inner.url.as_str()
    }

    /// Returns the destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.inner.lifecycle_read().status
    }

    /// Returns the bytes transferred so far in the current attempt.
    #[must_use]
    pub fn bytes_downloaded(&self) -> u64 {
        self.inner.current.load(Ordering::SeqCst)
    }

    /// Returns the declared content length, once the server has reported it.
    #[must_use]
    pub fn bytes_total(&self) -> Option<u64> {
        self.inner.lifecycle_read().total
    }

    /// Returns the number of attempts made in the current run.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.inner.attempts.load(Ordering::SeqCst)
    }

    /// Returns the configured maximum number of retries.
    #[must_use]
    pub fn retries(&self) -> u32 {
        self.inner.policy.retries()
    }

    /// Returns the retry policy this download was registered with.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.policy
    }

    /// Returns when the current run started, if it ever did.
    #[must_use]
    pub fn started_at(&self) -> Option<Instant> {
        self.inner.lifecycle_read().started_at
    }

    /// Returns how long the current run has been going.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at().map(|started| started.elapsed())
    }

    /// Returns the recorded failure detail, present only in `Failed` state.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.inner.lifecycle_read().last_error.clone()
    }

    /// Returns the completed percentage (0.0 to 100.0).
    ///
    /// Reports 0.0 while the total size is unknown.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress(&self) -> f64 {
        match self.bytes_total() {
            Some(total) if total > 0 => {
                (self.bytes_downloaded() as f64 / total as f64) * 100.0
            }
            _ => 0.0,
        }
    }

    /// Returns the average transfer speed in bytes per second since the
    /// current run started, or 0.0 if it never did.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn speed(&self) -> f64 {
        match self.elapsed() {
            Some(elapsed) if elapsed.as_secs_f64() > 0.0 => {
                self.bytes_downloaded() as f64 / elapsed.as_secs_f64()
            }
            _ => 0.0,
        }
    }

    /// Estimates the remaining transfer time from the average speed.
    ///
    /// `None` while the total size is unknown or no bytes have arrived yet.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn eta(&self) -> Option<Duration> {
        let total = self.bytes_total()?;
        let remaining = total.saturating_sub(self.bytes_downloaded());
        let speed = self.speed();
        if speed <= 0.0 {
            return None;
        }
        Duration::try_from_secs_f64(remaining as f64 / speed).ok()
    }
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url.as_str())
            .field("path", &self.inner.path)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Reads the latest cancellation request, if any.
fn check_interrupt(inner: &DownloadInner) -> Option<Interrupt> {
    match inner.control.load(Ordering::SeqCst) {
        CONTROL_STOP => Some(Interrupt::Stop),
        CONTROL_PAUSE => Some(Interrupt::Pause),
        _ => None,
    }
}

/// Settles the run into its resting state under the lifecycle lock.
///
/// The control flag is re-read under the lock so a stop requested while the
/// loop was about to pause is not lost; whichever request is latest at
/// observation time wins.
fn settle(inner: &DownloadInner, next: DownloadStatus, error: Option<String>) {
    let mut lifecycle = inner.lifecycle_write();
    let next = if next == DownloadStatus::Paused
        && inner.control.load(Ordering::SeqCst) == CONTROL_STOP
    {
        DownloadStatus::Stopped
    } else {
        next
    };
    let operation = match next {
        DownloadStatus::Paused => "pause",
        DownloadStatus::Stopped => "stop",
        DownloadStatus::Failed => "fail",
        _ => "finish",
    };
    lifecycle.last_error = error;
    if let Err(transition_error) = lifecycle.advance(operation, next) {
        warn!(id = %inner.id, error = %transition_error, "transfer settled into unexpected state");
        return;
    }
    info!(
        id = %inner.id,
        status = %next,
        bytes = inner.current.load(Ordering::SeqCst),
        "transfer settled"
    );
}

/// Retry loop driving one run of a download until it settles.
async fn run_transfer(inner: Arc<DownloadInner>) {
    loop {
        let attempt = inner.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(id = %inner.id, attempt, "attempting transfer");

        match transfer_once(&inner).await {
            Ok(None) => {
                // Stream exhausted. A stop request arriving at this final
                // boundary still wins over Finished.
                let next = if inner.control.load(Ordering::SeqCst) == CONTROL_STOP {
                    DownloadStatus::Stopped
                } else {
                    DownloadStatus::Finished
                };
                settle(&inner, next, None);
                return;
            }
            Ok(Some(Interrupt::Stop)) => {
                settle(&inner, DownloadStatus::Stopped, None);
                return;
            }
            Ok(Some(Interrupt::Pause)) => {
                settle(&inner, DownloadStatus::Paused, None);
                return;
            }
            Err(error) => {
                if attempt <= inner.policy.retries() && error.is_retryable() {
                    let delay = inner.policy.delay_for(attempt);
                    warn!(
                        id = %inner.id,
                        url = %inner.url,
                        attempt,
                        max_attempts = inner.policy.max_attempts(),
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "transfer attempt failed; retrying"
                    );
                    if let Some(interrupt) = wait_between_attempts(&inner, delay).await {
                        let next = match interrupt {
                            Interrupt::Stop => DownloadStatus::Stopped,
                            Interrupt::Pause => DownloadStatus::Paused,
                        };
                        settle(&inner, next, None);
                        return;
                    }
                } else {
                    warn!(
                        id = %inner.id,
                        url = %inner.url,
                        attempts = attempt,
                        error = %error,
                        "transfer failed; retries exhausted"
                    );
                    settle(&inner, DownloadStatus::Failed, Some(error.to_string()));
                    return;
                }
            }
        }
    }
}

/// One attempt: GET, then stream the body to the destination file.
///
/// Returns `Ok(None)` when the stream is exhausted, `Ok(Some(_))` when a
/// cancellation request was observed at a chunk boundary, and `Err` on any
/// transfer-level failure.
async fn transfer_once(inner: &DownloadInner) -> Result<Option<Interrupt>, DownloadError> {
    if let Some(interrupt) = check_interrupt(inner) {
        return Ok(Some(interrupt));
    }

    let response = inner.client.get(inner.url.as_str()).await?;

    {
        let mut lifecycle = inner.lifecycle_write();
        lifecycle.total = response.content_length();
    }
    inner.current.store(0, Ordering::SeqCst);

    if let Some(parent) = inner.path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DownloadError::io(parent, e))?;
        }
    }

    let file = File::create(&inner.path)
        .await
        .map_err(|e| DownloadError::io(&inner.path, e))?;
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();

    while let Some(chunk_result) = stream.next().await {
        if let Some(interrupt) = check_interrupt(inner) {
            // Keep already-written bytes intact on disk before bailing out.
            writer
                .flush()
                .await
                .map_err(|e| DownloadError::io(&inner.path, e))?;
            debug!(id = %inner.id, ?interrupt, "cancellation observed at chunk boundary");
            return Ok(Some(interrupt));
        }

        let chunk = chunk_result.map_err(|e| DownloadError::network(inner.url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(&inner.path, e))?;
        inner.current.fetch_add(chunk.len() as u64, Ordering::SeqCst);
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(&inner.path, e))?;

    Ok(None)
}

/// Interruptible backoff sleep, polling the control flag so a stop or pause
/// issued between attempts is not delayed by the full backoff.
async fn wait_between_attempts(inner: &DownloadInner, delay: Duration) -> Option<Interrupt> {
    let deadline = tokio::time::Instant::now() + delay;
    loop {
        if let Some(interrupt) = check_interrupt(inner) {
            return Some(interrupt);
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return check_interrupt(inner);
        }
        tokio::time::sleep(CONTROL_POLL_INTERVAL.min(deadline - now)).await;
    }
}
