//! End-to-end worker scenarios against the in-memory queue backend

mod common;

use std::sync::Arc;
use std::time::Duration;

use clarity_core::application::{ShutdownOutcome, ShutdownReason};
use clarity_core::port::queue_backend::mocks::InMemoryQueueBackend;
use clarity_core::port::QueueBackend;
use clarity_core::AppError;
use common::*;
use serde_json::Value;

#[tokio::test]
async fn test_mixed_outcomes_are_counted_once() {
    let backend = Arc::new(InMemoryQueueBackend::new());
    enqueue_all(
        &backend,
        "email",
        vec![
            ok_job("welcome"),
            failing_job("bounce-1"),
            ok_job("digest"),
            failing_job("bounce-2"),
            ok_job("receipt"),
        ],
    )
    .await;

    let worker = start(config(&["email"], 2, Duration::from_secs(5)), backend.clone())
        .await
        .unwrap();
    let state = worker.state();

    let stats = wait_for(&state, |s| s.processed + s.failed == 5).await;
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.active, 0);
    assert!(stats.last_activity.is_some());
    assert_eq!(stats.success_rate(), "60.00%");

    let counts = backend.counts("email").await.unwrap();
    assert_eq!(counts.completed, 3);
    assert_eq!(counts.failed, 2);
    assert_eq!(counts.waiting, 0);

    let health: Value = reqwest::get(url(&worker, "/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["processed"], 3);
    assert_eq!(health["failed"], 2);

    let metrics = reqwest::get(url(&worker, "/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("worker_jobs_processed_total{worker=\"it-worker\"} 3"), "{}", metrics);
    assert!(metrics.contains("worker_jobs_failed_total{worker=\"it-worker\"} 2"), "{}", metrics);
    assert!(metrics.contains("worker_jobs_active{worker=\"it-worker\"} 0"), "{}", metrics);

    worker.trigger().fire(ShutdownReason::Signal("SIGTERM"));
    let report = worker.wait().await;
    assert!(matches!(
        report.outcome,
        ShutdownOutcome::Clean {
            processed: 3,
            failed: 2,
            ..
        }
    ));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_status_at_startup() {
    let backend = Arc::new(InMemoryQueueBackend::new());
    let worker = start(
        config(&["sync", "email"], 3, Duration::from_secs(5)),
        backend,
    )
    .await
    .unwrap();

    let response = reqwest::get(url(&worker, "/status")).await.unwrap();
    assert_eq!(response.status(), 200);
    let status: Value = response.json().await.unwrap();

    assert_eq!(status["stats"]["processed"], 0);
    assert_eq!(status["stats"]["failed"], 0);
    assert_eq!(status["stats"]["active"], 0);
    assert_eq!(status["stats"]["successRate"], "N/A");
    assert!(status["stats"]["lastActivity"].is_null());
    assert_eq!(status["config"]["queues"], serde_json::json!(["sync", "email"]));
    assert_eq!(status["config"]["concurrency"], 3);
    let names: Vec<&str> = status["queues"]
        .as_array()
        .unwrap()
        .iter()
        .map(|q| q["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["sync", "email"]);
    assert_eq!(status["worker"]["name"], "it-worker");
    assert_eq!(status["worker"]["shuttingDown"], false);

    let metrics = reqwest::get(url(&worker, "/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(metrics.contains("worker_jobs_processed_total{worker=\"it-worker\"} 0"));

    let missing = reqwest::get(url(&worker, "/nope")).await.unwrap();
    assert_eq!(missing.status(), 404);

    worker.trigger().fire(ShutdownReason::Signal("SIGTERM"));
    assert_eq!(worker.wait().await.exit_code(), 0);
}

#[tokio::test]
async fn test_unknown_queue_fails_before_binding() {
    let port = {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        probe.local_addr().unwrap().port()
    };
    let mut config = config(&["email", "reports"], 1, Duration::from_secs(1));
    config.health_port = port;

    let err = start(config, Arc::new(InMemoryQueueBackend::new()))
        .await
        .err()
        .expect("unknown queue must fail startup");
    match err {
        AppError::Config(message) => assert!(message.contains("reports"), "{}", message),
        other => panic!("expected config error, got {:?}", other),
    }

    // Nothing listens on the port
    assert!(reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .is_err());
}

#[tokio::test]
async fn test_processor_panic_counts_as_failure() {
    use clarity_core::application::ProcessorRegistry;
    use clarity_core::port::job_processor::mocks::MockProcessor;
    use clarity_core::port::system_probe::mocks::MockSystemProbe;
    use clarity_core::port::time_provider::SystemTimeProvider;
    use clarity_worker::{start_worker, WorkerDeps};

    let backend = Arc::new(InMemoryQueueBackend::new());
    enqueue_all(&backend, "cleanup", vec![ok_job("purge"), ok_job("purge")]).await;

    let worker = start_worker(
        config(&["cleanup"], 1, Duration::from_secs(5)),
        WorkerDeps {
            backend,
            registry: ProcessorRegistry::new().register(
                "cleanup",
                Arc::new(MockProcessor::new_panic_inducing("disk vanished")),
            ),
            probe: Arc::new(MockSystemProbe::default()),
            time_provider: Arc::new(SystemTimeProvider),
        },
    )
    .await
    .unwrap();
    let state = worker.state();

    let stats = wait_for(&state, |s| s.failed == 2).await;
    assert_eq!(stats.processed, 0);
    assert_eq!(stats.active, 0);
    assert!(!stats.shutting_down, "a job panic must not stop the worker");

    worker.trigger().fire(ShutdownReason::Signal("SIGINT"));
    assert_eq!(worker.wait().await.exit_code(), 0);
}
