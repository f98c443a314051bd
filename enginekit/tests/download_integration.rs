//! Integration tests for resumable downloads against a real HTTP server.
//!
//! Run with: `cargo test --test download_integration`

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use enginekit::installer::{
    partial_path, DownloadManager, DownloadOptions, InstallError, ProgressCallback,
};
use enginekit::CancelToken;
use tempfile::TempDir;

use common::{payload, TestServer, STALL_AFTER};

const BODY_LEN: usize = 3 * 1024 * 1024 + 17;

fn manager() -> DownloadManager {
    DownloadManager::new(
        DownloadOptions::default()
            .with_max_retries(1)
            .with_timeout(Duration::from_secs(10))
            .with_retry_delay(Duration::from_millis(50)),
    )
    .unwrap()
}

fn no_progress() -> ProgressCallback {
    Box::new(|_, _| {})
}

#[tokio::test]
async fn test_full_download() {
    let body = payload(BODY_LEN);
    let server = TestServer::start(body.clone(), true).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("engine.7z");

    let size = manager()
        .download(&server.url("/files/engine.7z"), &dest, no_progress(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(size, BODY_LEN as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(server.ranges(), vec![None]);
}

#[tokio::test]
async fn test_resume_matches_full_download() {
    let body = payload(BODY_LEN);
    let server = TestServer::start(body.clone(), true).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("engine.7z");

    let offset = 1_234_567;
    std::fs::write(partial_path(&dest), &body[..offset]).unwrap();

    let size = manager()
        .download(&server.url("/files/engine.7z"), &dest, no_progress(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(size, BODY_LEN as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(server.ranges(), vec![Some(format!("bytes={}-", offset))]);
}

#[tokio::test]
async fn test_ignored_range_restarts_from_zero() {
    let body = payload(BODY_LEN);
    let server = TestServer::start(body.clone(), false).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("engine.7z");

    // Stale bytes that must not survive.
    std::fs::write(partial_path(&dest), vec![0xAAu8; 500_000]).unwrap();

    let size = manager()
        .download(&server.url("/files/engine.7z"), &dest, no_progress(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(size, BODY_LEN as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(server.requests(), 1);
    assert!(!partial_path(&dest).exists());
}

#[tokio::test]
async fn test_missing_artifact_exhausts_retries() {
    let server = TestServer::start(payload(1024), true).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("engine.7z");

    let result = manager()
        .download(&server.url("/missing"), &dest, no_progress(), &CancelToken::new())
        .await;

    assert!(matches!(
        result,
        Err(InstallError::DownloadFailed { attempts: 2, .. })
    ));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_cancel_mid_download_stops_requests() {
    let server = TestServer::start(payload(BODY_LEN), true).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("engine.7z");

    let started = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&started);
    let on_progress: ProgressCallback = Box::new(move |_, _| flag.store(true, Ordering::SeqCst));

    let cancel = CancelToken::new();
    let worker_cancel = cancel.clone();
    let url = server.url("/stall/engine.7z");
    let worker_dest = dest.clone();
    let handle = tokio::spawn(async move {
        manager()
            .download(&url, &worker_dest, on_progress, &worker_cancel)
            .await
    });

    tokio::time::timeout(Duration::from_secs(5), async {
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(InstallError::Cancelled)));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.requests(), 1);

    // Partial data is kept for a later resume, never at the final path.
    let kept = std::fs::metadata(partial_path(&dest)).unwrap().len();
    assert!(kept > 0 && kept <= STALL_AFTER as u64);
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_dropped_connection_resumes_on_next_attempt() {
    let body = payload(BODY_LEN);
    let server = TestServer::start(body.clone(), true).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("engine.7z");

    let size = manager()
        .download(&server.url("/drop-once/engine.7z"), &dest, no_progress(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(size, BODY_LEN as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(
        server.ranges(),
        vec![None, Some(format!("bytes={}-", STALL_AFTER))]
    );
    assert!(!partial_path(&dest).exists());
}

#[tokio::test]
async fn test_server_error_discards_partial_before_retry() {
    let body = payload(BODY_LEN);
    let server = TestServer::start(body.clone(), true).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("engine.7z");

    let offset = 700_000;
    std::fs::write(partial_path(&dest), &body[..offset]).unwrap();

    let size = manager()
        .download(&server.url("/busy-once/engine.7z"), &dest, no_progress(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(size, BODY_LEN as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    // The 503 deleted the partial file, so the retry starts from zero.
    assert_eq!(
        server.ranges(),
        vec![Some(format!("bytes={}-", offset)), None]
    );
}

#[tokio::test]
async fn test_unsatisfiable_range_discards_partial_before_retry() {
    let body = payload(1024);
    let server = TestServer::start(body.clone(), true).await;
    let temp = TempDir::new().unwrap();
    let dest = temp.path().join("engine.7z");

    // Longer than the resource, so the resume range cannot be served.
    std::fs::write(partial_path(&dest), vec![1u8; 2048]).unwrap();

    let size = manager()
        .download(&server.url("/files/engine.7z"), &dest, no_progress(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(size, 1024);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(server.ranges(), vec![Some("bytes=2048-".to_string()), None]);
}
