//! End-to-end download lifecycle tests against a mock HTTP server.
//!
//! Covers: full streaming completion, retry exhaustion, internal retry
//! recovery, cooperative stop/pause/resume, and restart after failure.

use std::time::Duration;

use downpour::{Backoff, DownloadRegistry, DownloadStatus, RetryPolicy};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// Deterministic, non-trivial body so truncation or reordering would show.
fn patterned_body(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_download_completes_with_full_contents() {
    init_tracing();
    let server = MockServer::start().await;
    let body = patterned_body(256 * 1024);

    Mock::given(method("GET"))
        .and(path("/archive.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("archive.bin");
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/archive.bin", server.uri()),
            &destination,
            RetryPolicy::default(),
        )
        .unwrap();

    download.start().await.unwrap();
    download.wait().await;

    assert_eq!(download.status(), DownloadStatus::Finished);
    assert_eq!(download.bytes_downloaded(), body.len() as u64);
    assert_eq!(download.bytes_total(), Some(body.len() as u64));
    assert_eq!(download.attempts(), 1);
    assert!(download.error().is_none());
    assert!((download.progress() - 100.0).abs() < 0.01);
    assert!(download.started_at().is_some());

    let written = std::fs::read(&destination).unwrap();
    assert_eq!(written, body, "file on disk must match the served body");
}

#[tokio::test]
async fn test_server_error_exhausts_retries() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/flaky.bin"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/flaky.bin", server.uri()),
            temp.path().join("flaky.bin"),
            RetryPolicy::new(2, Backoff::None),
        )
        .unwrap();

    download.start().await.unwrap();
    download.wait().await;

    assert_eq!(download.status(), DownloadStatus::Failed);
    assert_eq!(download.attempts(), 3, "retries = 2 means exactly 3 attempts");
    let error = download.error().unwrap();
    assert!(error.contains("500"), "error detail should name the status: {error}");
}

#[tokio::test]
async fn test_transient_errors_recover_within_retry_budget() {
    init_tracing();
    let server = MockServer::start().await;
    let body = patterned_body(4096);

    // First two requests fail with 503, then the fallback mock serves the file.
    Mock::given(method("GET"))
        .and(path("/recover.bin"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/recover.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("recover.bin");
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/recover.bin", server.uri()),
            &destination,
            RetryPolicy::new(3, Backoff::None),
        )
        .unwrap();

    download.start().await.unwrap();
    download.wait().await;

    assert_eq!(download.status(), DownloadStatus::Finished);
    assert_eq!(download.attempts(), 3);
    assert_eq!(std::fs::read(&destination).unwrap(), body);
}

#[tokio::test]
async fn test_start_while_downloading_is_rejected() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(patterned_body(1024))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/slow.bin", server.uri()),
            temp.path().join("slow.bin"),
            RetryPolicy::default(),
        )
        .unwrap();

    download.start().await.unwrap();
    assert_eq!(download.status(), DownloadStatus::Downloading);

    let error = download.start().await.unwrap_err();
    assert!(
        matches!(error, downpour::DownloadError::InvalidState { .. }),
        "second start must be rejected: {error}"
    );
    assert_eq!(download.status(), DownloadStatus::Downloading);

    download.wait().await;
    assert_eq!(download.status(), DownloadStatus::Finished);
}

#[tokio::test]
async fn test_stop_halts_transfer_and_keeps_registry_entry() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/big.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(patterned_body(64 * 1024))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/big.bin", server.uri()),
            temp.path().join("big.bin"),
            RetryPolicy::default(),
        )
        .unwrap();

    download.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    download.stop().unwrap();
    download.wait().await;

    assert_eq!(download.status(), DownloadStatus::Stopped);
    assert!(download.error().is_none());
    assert!(
        registry.get(download.id()).is_some(),
        "stopping must not remove the registry entry"
    );
}

#[tokio::test]
async fn test_pause_then_resume_restarts_and_completes() {
    init_tracing();
    let server = MockServer::start().await;
    let body = patterned_body(32 * 1024);

    Mock::given(method("GET"))
        .and(path("/resumable.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.clone())
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("resumable.bin");
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/resumable.bin", server.uri()),
            &destination,
            RetryPolicy::default(),
        )
        .unwrap();

    download.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    download.pause().unwrap();
    download.wait().await;
    assert_eq!(download.status(), DownloadStatus::Paused);

    // Resuming a paused download is the only valid way back in.
    download.resume().await.unwrap();
    download.wait().await;

    assert_eq!(download.status(), DownloadStatus::Finished);
    assert_eq!(download.bytes_downloaded(), body.len() as u64);
    assert_eq!(
        std::fs::read(&destination).unwrap(),
        body,
        "restart-from-zero must produce the complete file"
    );
}

#[tokio::test]
async fn test_resume_rejected_unless_paused() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/file.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(patterned_body(128)))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/file.bin", server.uri()),
            temp.path().join("file.bin"),
            RetryPolicy::default(),
        )
        .unwrap();

    // Pending, and later Finished: both must reject resume.
    assert!(download.resume().await.is_err());

    download.start().await.unwrap();
    download.wait().await;
    assert_eq!(download.status(), DownloadStatus::Finished);
    assert!(download.resume().await.is_err());
}

#[tokio::test]
async fn test_stop_from_paused() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pausable.bin"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(patterned_body(8192))
                .set_delay(Duration::from_millis(400)),
        )
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/pausable.bin", server.uri()),
            temp.path().join("pausable.bin"),
            RetryPolicy::default(),
        )
        .unwrap();

    download.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    download.pause().unwrap();
    download.wait().await;
    assert_eq!(download.status(), DownloadStatus::Paused);

    download.stop().unwrap();
    assert_eq!(download.status(), DownloadStatus::Stopped);
}

#[tokio::test]
async fn test_restart_after_failure_clears_error() {
    init_tracing();
    let server = MockServer::start().await;
    let body = patterned_body(2048);

    // One 500, then the fallback serves the file: the first run fails with no
    // retry budget, and an explicit restart succeeds from scratch.
    Mock::given(method("GET"))
        .and(path("/second-chance.bin"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/second-chance.bin"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let destination = temp.path().join("second-chance.bin");
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/second-chance.bin", server.uri()),
            &destination,
            RetryPolicy::no_retries(),
        )
        .unwrap();

    download.start().await.unwrap();
    download.wait().await;
    assert_eq!(download.status(), DownloadStatus::Failed);
    assert_eq!(download.attempts(), 1);
    assert!(download.error().is_some());

    download.start().await.unwrap();
    download.wait().await;
    assert_eq!(download.status(), DownloadStatus::Finished);
    assert_eq!(download.attempts(), 1, "restart begins a fresh attempt count");
    assert!(download.error().is_none(), "failure detail is cleared on restart");
    assert_eq!(std::fs::read(&destination).unwrap(), body);
}

#[tokio::test]
async fn test_not_found_is_recorded_as_failure() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing.bin"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let registry = DownloadRegistry::new();
    let download = registry
        .add(
            &format!("{}/missing.bin", server.uri()),
            temp.path().join("missing.bin"),
            RetryPolicy::no_retries(),
        )
        .unwrap();

    download.start().await.unwrap();
    download.wait().await;

    assert_eq!(download.status(), DownloadStatus::Failed);
    let error = download.error().unwrap();
    assert!(error.contains("404"), "error detail should name the status: {error}");
}
