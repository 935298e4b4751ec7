// Job Processor Port
// The unit of work behind a queue: payload + attempts in, result or error out

use crate::domain::Job;
use async_trait::async_trait;
use thiserror::Error;

/// Processor errors
///
/// Every variant becomes a `failed` job; retrying is the backend's decision.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProcessorError {
    #[error("Job failed: {0}")]
    Failed(String),

    #[error("Job timed out after {0}ms")]
    Timeout(u64),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("IO error: {0}")]
    Io(String),
}

/// Job Processor trait
///
/// Implementations:
/// - CommandProcessor: bridges to the web application's handler scripts
/// - MockProcessor: scripted behavior for tests
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Short name used in logs (e.g. `sync`, `notification`)
    fn name(&self) -> &str;

    /// Run one job
    ///
    /// `job.payload` and `job.attempts_made` are the processor's inputs.
    async fn process(&self, job: &Job) -> Result<serde_json::Value, ProcessorError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock processor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed with the given value
        Succeed(serde_json::Value),
        /// Always fail with message
        Fail(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
        /// Read `fail`, `hang` and `delayMs` from the payload
        FromPayload,
    }

    /// Mock Job Processor for testing
    pub struct MockProcessor {
        name: String,
        behavior: MockBehavior,
        delay: Option<Duration>,
        call_count: AtomicUsize,
    }

    impl MockProcessor {
        pub fn new(name: impl Into<String>, behavior: MockBehavior) -> Self {
            Self {
                name: name.into(),
                behavior,
                delay: None,
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn new_success() -> Self {
            Self::new("mock", MockBehavior::Succeed(serde_json::json!({"ok": true})))
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new("mock", MockBehavior::Fail(message.into()))
        }

        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new("mock", MockBehavior::Panic(message.into()))
        }

        pub fn payload_driven() -> Self {
            Self::new("mock", MockBehavior::FromPayload)
        }

        /// Sleep this long before applying the behavior
        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobProcessor for MockProcessor {
        fn name(&self) -> &str {
            &self.name
        }

        async fn process(&self, job: &Job) -> Result<serde_json::Value, ProcessorError> {
            self.call_count.fetch_add(1, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match &self.behavior {
                MockBehavior::Succeed(value) => Ok(value.clone()),
                MockBehavior::Fail(msg) => Err(ProcessorError::Failed(msg.clone())),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for panic isolation testing
                }
                MockBehavior::FromPayload => {
                    let payload = job.payload.as_value();
                    if let Some(ms) = payload.get("delayMs").and_then(|v| v.as_u64()) {
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                    }
                    if payload.get("hang").and_then(|v| v.as_bool()) == Some(true) {
                        return std::future::pending().await;
                    }
                    if payload.get("fail").and_then(|v| v.as_bool()) == Some(true) {
                        return Err(ProcessorError::Failed(format!(
                            "{} failed on attempt {}",
                            job.name,
                            job.attempts_made + 1
                        )));
                    }
                    Ok(serde_json::json!({
                        "job": job.name,
                        "attemptsMade": job.attempts_made,
                    }))
                }
            }
        }
    }
}
