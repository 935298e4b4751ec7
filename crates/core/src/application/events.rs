// Lifecycle events: consumers and schedulers send, one aggregator applies

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::application::state::WorkerRuntimeState;
use crate::domain::JobId;
use crate::port::{FailureDisposition, StallRecovery};

/// Job and queue lifecycle events
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    /// A consumer started pulling from its queue
    Ready { queue: String },
    Active {
        queue: String,
        job_id: JobId,
        job_name: String,
        attempts_made: u32,
    },
    Completed {
        queue: String,
        job_id: JobId,
        job_name: String,
        duration_ms: u64,
    },
    Failed {
        queue: String,
        job_id: JobId,
        job_name: String,
        error: String,
        attempts_made: u32,
        /// None when the backend could not record the failure
        disposition: Option<FailureDisposition>,
    },
    Stalled {
        queue: String,
        job_id: JobId,
        recovery: StallRecovery,
    },
    /// Consumer, scheduler or connection error not tied to a job outcome
    Error { queue: String, message: String },
}

pub type EventSender = mpsc::UnboundedSender<WorkerEvent>;

/// Single writer of the runtime counters
///
/// Runs until every `EventSender` is dropped, so awaiting it after the pool
/// has closed guarantees every emitted event was applied.
pub struct EventAggregator {
    state: Arc<WorkerRuntimeState>,
    rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl EventAggregator {
    pub fn channel(state: Arc<WorkerRuntimeState>) -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { state, rx })
    }

    pub async fn run(mut self) {
        while let Some(event) = self.rx.recv().await {
            self.apply(&event);
        }
        debug!(worker = %self.state.worker_name(), "Event channel closed");
    }

    /// Update counters and log, exactly once per event
    fn apply(&self, event: &WorkerEvent) {
        let worker = self.state.worker_name();
        match event {
            WorkerEvent::Ready { queue } => {
                info!(worker, queue_name = %queue, "Worker ready");
            }
            WorkerEvent::Active {
                queue,
                job_id,
                job_name,
                attempts_made,
            } => {
                self.state.record_active();
                info!(
                    worker,
                    queue_name = %queue,
                    job_id = %job_id,
                    job_name = %job_name,
                    attempts_made,
                    "Job started"
                );
            }
            WorkerEvent::Completed {
                queue,
                job_id,
                job_name,
                duration_ms,
            } => {
                self.state.record_completed();
                info!(
                    worker,
                    queue_name = %queue,
                    job_id = %job_id,
                    job_name = %job_name,
                    duration_ms,
                    "Job completed"
                );
            }
            WorkerEvent::Failed {
                queue,
                job_id,
                job_name,
                error: message,
                attempts_made,
                disposition,
            } => {
                self.state.record_failed();
                let retry_in_ms = match disposition {
                    Some(FailureDisposition::Retrying { delay_ms }) => Some(*delay_ms),
                    _ => None,
                };
                error!(
                    worker,
                    queue_name = %queue,
                    job_id = %job_id,
                    job_name = %job_name,
                    error = %message,
                    attempts_made,
                    retry_in_ms,
                    "Job failed"
                );
            }
            WorkerEvent::Stalled {
                queue,
                job_id,
                recovery,
            } => {
                self.state.record_activity();
                warn!(
                    worker,
                    queue_name = %queue,
                    job_id = %job_id,
                    recovery = ?recovery,
                    "Job stalled"
                );
            }
            WorkerEvent::Error { queue, message } => {
                error!(worker, queue_name = %queue, error = %message, "Worker error");
            }
        }
    }
}
