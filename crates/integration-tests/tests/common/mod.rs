//! Shared fixtures for the end-to-end worker tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use clarity_core::application::{ProcessorRegistry, StatsSnapshot, WorkerConfig, WorkerRuntimeState};
use clarity_core::domain::NewJob;
use clarity_core::port::job_processor::mocks::MockProcessor;
use clarity_core::port::queue_backend::mocks::InMemoryQueueBackend;
use clarity_core::port::system_probe::mocks::MockSystemProbe;
use clarity_core::port::time_provider::SystemTimeProvider;
use clarity_core::port::QueueBackend;
use clarity_worker::{start_worker, RunningWorker, WorkerDeps};

pub fn config(queues: &[&str], concurrency: usize, shutdown_timeout: Duration) -> WorkerConfig {
    WorkerConfig {
        worker_name: "it-worker".to_string(),
        queues: queues.iter().map(|q| q.to_string()).collect(),
        concurrency,
        health_port: 0,
        shutdown_timeout,
        ..Default::default()
    }
}

/// Every default queue served by a payload-driven mock
pub fn registry() -> ProcessorRegistry {
    let processor = Arc::new(MockProcessor::payload_driven());
    ["sync", "email", "cleanup", "webhook", "notifications"]
        .into_iter()
        .fold(ProcessorRegistry::new(), |registry, queue| {
            registry.register(queue, processor.clone())
        })
}

pub async fn start(
    config: WorkerConfig,
    backend: Arc<InMemoryQueueBackend>,
) -> clarity_core::Result<RunningWorker> {
    start_worker(
        config,
        WorkerDeps {
            backend,
            registry: registry(),
            probe: Arc::new(MockSystemProbe::default()),
            time_provider: Arc::new(SystemTimeProvider),
        },
    )
    .await
}

/// Job that succeeds, fails once (no retries), sleeps or never finishes
pub fn ok_job(name: &str) -> NewJob {
    NewJob::new(name, serde_json::json!({})).with_max_attempts(1)
}

pub fn failing_job(name: &str) -> NewJob {
    NewJob::new(name, serde_json::json!({"fail": true})).with_max_attempts(1)
}

pub fn slow_job(name: &str, delay_ms: u64) -> NewJob {
    NewJob::new(name, serde_json::json!({"delayMs": delay_ms})).with_max_attempts(1)
}

pub fn hung_job(name: &str) -> NewJob {
    NewJob::new(name, serde_json::json!({"hang": true})).with_max_attempts(1)
}

pub async fn enqueue_all(backend: &InMemoryQueueBackend, queue: &str, jobs: Vec<NewJob>) {
    for job in jobs {
        backend.enqueue(queue, job).await.unwrap();
    }
}

/// Poll the runtime state until `done` holds or five seconds pass
pub async fn wait_for(
    state: &WorkerRuntimeState,
    done: impl Fn(&StatsSnapshot) -> bool,
) -> StatsSnapshot {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stats = state.snapshot();
        if done(&stats) {
            return stats;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached, last stats: {:?}",
            stats
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn url(worker: &RunningWorker, path: &str) -> String {
    format!("http://127.0.0.1:{}{}", worker.http_addr().port(), path)
}
