//! Tests for the interpreter host lifecycle and status side-channel.

use std::sync::Arc;

use pyrite_core::{Error, HostPhase, InterpreterHost, SessionConfig};
use tempfile::TempDir;

fn test_host(dir: &TempDir) -> InterpreterHost {
    InterpreterHost::new(SessionConfig {
        root: Some(dir.path().to_path_buf()),
        skip_preload: true,
    })
}

#[tokio::test]
async fn test_acquire_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let host = test_host(&dir);
    assert_eq!(host.phase(), HostPhase::Uninitialized);

    let first = host.acquire().await.unwrap();
    assert_eq!(host.phase(), HostPhase::Ready);

    let second = host.acquire().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_concurrent_acquire_shares_one_load() {
    let dir = TempDir::new().unwrap();
    let host = test_host(&dir);

    let (first, second) = tokio::join!(host.acquire(), host.acquire());
    let first = first.unwrap();
    let second = second.unwrap();

    // Both callers must see the same session; a duplicate load would
    // hand out distinct instances.
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn test_status_side_channel_reports_ready() {
    let dir = TempDir::new().unwrap();
    let host = test_host(&dir);
    let mut status = host.subscribe_status();

    host.acquire().await.unwrap();

    let mut saw_ready = false;
    while let Ok(message) = status.try_recv() {
        if message == "Ready" {
            saw_ready = true;
        }
    }
    assert!(saw_ready);
}

#[tokio::test]
async fn test_install_requires_ready_session() {
    let dir = TempDir::new().unwrap();
    let host = test_host(&dir);

    let result = host.install_package("requests").await;
    assert!(matches!(result, Err(Error::NotReady(_))));
    assert_eq!(host.phase(), HostPhase::Uninitialized);
}

#[tokio::test]
async fn test_execute_initializes_lazily() {
    let dir = TempDir::new().unwrap();
    let host = test_host(&dir);

    let output = host.execute("21 * 2").await.unwrap();
    assert_eq!(output.records()[0].payload, "42");
    assert_eq!(host.phase(), HostPhase::Ready);
}

#[tokio::test]
async fn test_failed_load_shared_and_retried() {
    let dir = TempDir::new().unwrap();
    // Rooting the session at a plain file makes directory creation,
    // and so the whole load, fail.
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, "x").unwrap();
    let host = InterpreterHost::new(SessionConfig {
        root: Some(file),
        skip_preload: true,
    });

    let (first, second) = tokio::join!(host.acquire(), host.acquire());
    assert!(first.is_err());
    assert!(second.is_err());
    assert_eq!(host.phase(), HostPhase::Failed);
    assert!(host.last_error().is_some());

    // Waiters of the dead load must not disturb later state: a retry
    // starts from Failed and reports its own outcome.
    let retry = host.acquire().await;
    assert!(retry.is_err());
    assert_eq!(host.phase(), HostPhase::Failed);
}

#[tokio::test]
async fn test_session_directories_exist_after_acquire() {
    let dir = TempDir::new().unwrap();
    let host = test_host(&dir);

    let session = host.acquire().await.unwrap();
    assert!(session.dirs().workspace_dir.exists());
    assert!(session.dirs().scratch_dir.exists());
}
