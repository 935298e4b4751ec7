//! Shutdown coordination: drain outcomes, exit codes, idempotent triggers

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use clarity_core::application::{ShutdownOutcome, ShutdownReason};
use clarity_core::port::queue_backend::mocks::InMemoryQueueBackend;
use common::*;
use serde_json::Value;

#[tokio::test]
async fn test_in_flight_job_finishes_before_exit() {
    let backend = Arc::new(InMemoryQueueBackend::new());
    enqueue_all(&backend, "sync", vec![slow_job("portfolio-refresh", 200)]).await;

    let worker = start(config(&["sync"], 2, Duration::from_secs(5)), backend)
        .await
        .unwrap();
    let state = worker.state();
    wait_for(&state, |s| s.active == 1).await;

    assert!(worker.trigger().fire(ShutdownReason::Signal("SIGTERM")));
    let report = worker.wait().await;

    assert_eq!(report.reason, ShutdownReason::Signal("SIGTERM"));
    assert!(
        matches!(
            report.outcome,
            ShutdownOutcome::Clean {
                processed: 1,
                failed: 0,
                ..
            }
        ),
        "{:?}",
        report.outcome
    );
    assert_eq!(report.exit_code(), 0);
    assert_eq!(state.snapshot().active, 0);
}

#[tokio::test]
async fn test_hung_job_times_out_with_exit_1() {
    let backend = Arc::new(InMemoryQueueBackend::new());
    enqueue_all(&backend, "cleanup", vec![hung_job("purge-stale")]).await;

    let timeout = Duration::from_millis(200);
    let worker = start(config(&["cleanup"], 1, timeout), backend)
        .await
        .unwrap();
    let state = worker.state();
    wait_for(&state, |s| s.active == 1).await;

    worker.trigger().fire(ShutdownReason::Signal("SIGTERM"));
    let started = Instant::now();
    let report = worker.wait().await;

    assert_eq!(report.outcome, ShutdownOutcome::TimedOut { timeout });
    assert_eq!(report.exit_code(), 1);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_second_trigger_is_ignored() {
    let backend = Arc::new(InMemoryQueueBackend::new());
    let worker = start(config(&["email"], 1, Duration::from_secs(5)), backend)
        .await
        .unwrap();

    let trigger = worker.trigger();
    assert!(trigger.fire(ShutdownReason::Signal("SIGINT")));
    assert!(!trigger.fire(ShutdownReason::Signal("SIGTERM")));
    assert!(!worker.trigger().fire(ShutdownReason::Fatal("late".to_string())));

    let report = worker.wait().await;
    assert_eq!(report.reason, ShutdownReason::Signal("SIGINT"));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_health_reports_503_once_shutdown_begins() {
    let backend = Arc::new(InMemoryQueueBackend::new());
    let worker = start(config(&["email", "sync"], 1, Duration::from_secs(5)), backend)
        .await
        .unwrap();

    let before = reqwest::get(url(&worker, "/health")).await.unwrap();
    assert_eq!(before.status(), 200);

    worker.trigger().fire(ShutdownReason::Signal("SIGTERM"));

    // The server stays up until the drain closes it
    let after = reqwest::get(url(&worker, "/health")).await.unwrap();
    assert_eq!(after.status(), 503);
    let body: Value = after.json().await.unwrap();
    assert_eq!(body["status"], "unhealthy");

    let status: Value = reqwest::get(url(&worker, "/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["worker"]["shuttingDown"], true);

    let addr = url(&worker, "/health");
    assert_eq!(worker.wait().await.exit_code(), 0);
    assert!(reqwest::get(addr).await.is_err(), "server must be closed after drain");
}

#[tokio::test]
async fn test_fatal_reason_exits_1_after_clean_drain() {
    let backend = Arc::new(InMemoryQueueBackend::new());
    let worker = start(config(&["webhook"], 1, Duration::from_secs(5)), backend)
        .await
        .unwrap();

    worker
        .trigger()
        .fire(ShutdownReason::Fatal("redis connection lost".to_string()));
    let report = worker.wait().await;

    assert!(matches!(report.outcome, ShutdownOutcome::Clean { .. }));
    assert_eq!(report.exit_code(), 1);
}
