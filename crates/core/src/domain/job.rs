// Job Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};
use crate::domain::queue::QueueId;

/// Job ID (UUID v4)
pub type JobId = String;

/// Default number of attempts before a job is moved to the failed list
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Job State as recorded by the queue backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Delayed,
    Active,
    Completed,
    Failed,
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Waiting => write!(f, "waiting"),
            JobState::Delayed => write!(f, "delayed"),
            JobState::Active => write!(f, "active"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
        }
    }
}

/// Job Payload (opaque to the worker)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload(serde_json::Value);

impl JobPayload {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Job Entity
///
/// The document is owned by the queue backend. The worker reads it on
/// reservation and hands the updated copy back on completion or failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub queue: QueueId,
    pub payload: JobPayload,
    pub state: JobState,

    /// Failed attempts so far; processors see this to adapt retries
    pub attempts_made: u32,
    pub max_attempts: u32,
    /// Base retry delay, `None` falls back to the backend's retry policy
    #[serde(default)]
    pub backoff_ms: Option<u64>,

    pub created_at: i64, // epoch ms
    #[serde(default)]
    pub processed_at: Option<i64>,
    #[serde(default)]
    pub finished_at: Option<i64>,

    #[serde(default)]
    pub return_value: Option<serde_json::Value>,
    #[serde(default)]
    pub failed_reason: Option<String>,
}

impl Job {
    /// Create a new waiting job
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    /// * `queue` - Queue name
    /// * `name` - Logical job name
    /// * `payload` - Job payload
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        queue: impl Into<String>,
        name: impl Into<String>,
        payload: JobPayload,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            queue: queue.into(),
            payload,
            state: JobState::Waiting,
            attempts_made: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: None,
            created_at,
            processed_at: None,
            finished_at: None,
            return_value: None,
            failed_reason: None,
        }
    }

    /// Build the backend document for an enqueue request
    pub fn from_request(id: impl Into<String>, created_at: i64, queue: &str, req: NewJob) -> Self {
        let mut job = Self::new(id, created_at, queue, req.name, JobPayload::new(req.payload));
        job.max_attempts = req.max_attempts.max(1);
        job.backoff_ms = req.backoff_ms;
        if req.delay_ms > 0 {
            job.state = JobState::Delayed;
        }
        job
    }

    /// Transition to Active with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if !matches!(self.state, JobState::Waiting | JobState::Delayed) {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: JobState::Active.to_string(),
            });
        }
        self.state = JobState::Active;
        self.processed_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Completed with explicit timestamp
    pub fn complete(&mut self, now_millis: i64, value: serde_json::Value) -> Result<()> {
        if self.state != JobState::Active {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: JobState::Completed.to_string(),
            });
        }
        self.state = JobState::Completed;
        self.finished_at = Some(now_millis);
        self.return_value = Some(value);
        Ok(())
    }

    /// Record a failed attempt; the backend then decides between retry and failure
    pub fn record_failure(&mut self, now_millis: i64, reason: impl Into<String>) {
        self.attempts_made += 1;
        self.failed_reason = Some(reason.into());
        self.finished_at = Some(now_millis);
    }

    /// Move back to the delayed set after a retryable failure
    pub fn schedule_retry(&mut self) {
        self.state = JobState::Delayed;
        self.processed_at = None;
    }

    /// Mark as Failed for good
    pub fn fail(&mut self) {
        self.state = JobState::Failed;
    }

    /// True while the job still has attempts left
    pub fn can_retry(&self) -> bool {
        self.attempts_made < self.max_attempts
    }
}

/// Enqueue request as accepted by a queue backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJob {
    pub name: String,
    pub payload: serde_json::Value,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl NewJob {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_ms: None,
            delay_ms: 0,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.backoff_ms = Some(backoff_ms);
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}
