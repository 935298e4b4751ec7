//! Every line a worker logs names the worker, directly or through its span

mod common;

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clarity_core::application::ShutdownReason;
use clarity_core::domain::NewJob;
use clarity_core::port::queue_backend::mocks::InMemoryQueueBackend;
use clarity_core::port::QueueBackend;
use common::*;
use serde_json::Value;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Capture {
    fn lines(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

fn worker_of(line: &Value) -> Option<&str> {
    line["worker"].as_str().or_else(|| line["span"]["worker"].as_str())
}

// Current-thread runtime: every task logs through the thread-local subscriber
#[tokio::test]
async fn test_every_worker_log_line_carries_worker_name() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::registry()
        .with(
            Targets::new()
                .with_target("clarity_core", Level::DEBUG)
                .with_target("clarity_api_http", Level::DEBUG)
                .with_target("clarity_worker", Level::DEBUG),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(capture.clone()),
        );
    let _default = tracing::subscriber::set_default(subscriber);

    let backend = Arc::new(InMemoryQueueBackend::new());
    enqueue_all(
        &backend,
        "email",
        vec![ok_job("welcome"), failing_job("bounce"), slow_job("digest", 50)],
    )
    .await;
    // Retried once, so the retry policy logs from inside the job
    backend
        .enqueue(
            "email",
            NewJob::new("retry", serde_json::json!({"fail": true})).with_max_attempts(2),
        )
        .await
        .unwrap();

    let worker = start(config(&["email"], 2, Duration::from_secs(5)), backend)
        .await
        .unwrap();
    let state = worker.state();
    wait_for(&state, |s| s.processed + s.failed == 4).await;
    reqwest::get(url(&worker, "/status")).await.unwrap();

    worker.trigger().fire(ShutdownReason::Signal("SIGTERM"));
    assert_eq!(worker.wait().await.exit_code(), 0);

    let lines = capture.lines();
    let messages: Vec<&str> = lines.iter().filter_map(|l| l["message"].as_str()).collect();
    for expected in [
        "Consumer started",
        "Scheduler started",
        "Health server listening",
        "Scheduling retry",
        "Consumer closed",
        "Scheduler closed",
        "Health server stopped",
    ] {
        assert!(messages.contains(&expected), "missing '{}' in {:?}", expected, messages);
    }
    for line in &lines {
        assert_eq!(worker_of(line), Some("it-worker"), "line without worker: {}", line);
    }
}
