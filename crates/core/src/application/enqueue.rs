// Enqueue Use Case (operator CLI and tests)

use crate::domain::{JobId, NewJob, DEFAULT_QUEUES};
use crate::error::{AppError, Result};
use crate::port::QueueBackend;
use serde::{Deserialize, Serialize};

const MAX_QUEUE_NAME_LEN: usize = 64;
const MAX_JOB_NAME_LEN: usize = 128;
const MAX_ATTEMPTS_LIMIT: u32 = 25;

/// Enqueue request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueRequest {
    pub queue: String,
    pub name: String,
    pub payload: serde_json::Value,

    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub backoff_ms: Option<u64>,
    #[serde(default)]
    pub delay_ms: u64,
}

/// Check a request before it reaches the backend
pub fn validate_request(req: &EnqueueRequest) -> Result<()> {
    if req.queue.is_empty() {
        return Err(AppError::Validation("queue name cannot be empty".to_string()));
    }
    if req.queue.len() > MAX_QUEUE_NAME_LEN {
        return Err(AppError::Validation(format!(
            "queue name too long ({} > {})",
            req.queue.len(),
            MAX_QUEUE_NAME_LEN
        )));
    }
    if !req
        .queue
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(AppError::Validation(
            "queue name must be alphanumeric (with - or _)".to_string(),
        ));
    }

    if req.name.trim().is_empty() {
        return Err(AppError::Validation("job name cannot be empty".to_string()));
    }
    if req.name.len() > MAX_JOB_NAME_LEN {
        return Err(AppError::Validation(format!(
            "job name too long ({} > {})",
            req.name.len(),
            MAX_JOB_NAME_LEN
        )));
    }

    if let Some(attempts) = req.max_attempts {
        if attempts == 0 || attempts > MAX_ATTEMPTS_LIMIT {
            return Err(AppError::Validation(format!(
                "max attempts must be between 1 and {}",
                MAX_ATTEMPTS_LIMIT
            )));
        }
    }

    if !req.payload.is_object() {
        return Err(AppError::Validation("payload must be a JSON object".to_string()));
    }

    Ok(())
}

/// True for the queues the worker ships processors for
pub fn is_known_queue(queue: &str) -> bool {
    DEFAULT_QUEUES.contains(&queue)
}

/// Validate and push a job into its queue
///
/// # Arguments
///
/// * `backend` - Queue backend (system of record)
/// * `req` - Enqueue request
pub async fn execute(backend: &dyn QueueBackend, req: EnqueueRequest) -> Result<JobId> {
    validate_request(&req)?;

    let mut job = NewJob::new(req.name, req.payload).with_delay_ms(req.delay_ms);
    if let Some(attempts) = req.max_attempts {
        job = job.with_max_attempts(attempts);
    }
    if let Some(backoff_ms) = req.backoff_ms {
        job = job.with_backoff_ms(backoff_ms);
    }

    backend.enqueue(&req.queue, job).await
}
