// Scheduler companion - delayed promotion and stall recovery for one queue

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, Instrument};

use crate::application::coordinator::ShutdownTrigger;
use crate::application::events::{EventSender, WorkerEvent};
use crate::application::worker::constants::SCHEDULER_INTERVAL;
use crate::application::worker::{
    shutdown_channel, spawn_supervised, worker_span, ServiceHandle, ShutdownToken,
};
use crate::port::QueueBackend;

/// Outcome of one scheduler pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickSummary {
    pub promoted: usize,
    pub stalled: usize,
}

/// Periodically moves due delayed jobs to waiting and recovers expired locks
///
/// Created for the same backend and queue as its consumer and closed in the
/// same shutdown pass, after the consumers.
pub struct QueueScheduler {
    queue: String,
    worker_name: String,
    backend: Arc<dyn QueueBackend>,
    events: EventSender,
    interval: Duration,
}

impl QueueScheduler {
    pub fn new(
        queue: impl Into<String>,
        worker_name: &str,
        backend: Arc<dyn QueueBackend>,
        events: EventSender,
    ) -> Self {
        Self {
            queue: queue.into(),
            worker_name: worker_name.to_string(),
            backend,
            events,
            interval: SCHEDULER_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One pass: promote, then recover stalled jobs
    ///
    /// Backend errors become `Error` events; the next tick tries again.
    pub async fn tick(&self) -> TickSummary {
        let mut summary = TickSummary::default();

        match self.backend.promote_delayed(&self.queue).await {
            Ok(promoted) => summary.promoted = promoted,
            Err(e) => self.emit(WorkerEvent::Error {
                queue: self.queue.clone(),
                message: format!("failed to promote delayed jobs: {}", e),
            }),
        }

        match self.backend.recover_stalled(&self.queue).await {
            Ok(stalled) => {
                summary.stalled = stalled.len();
                for job in stalled {
                    self.emit(WorkerEvent::Stalled {
                        queue: self.queue.clone(),
                        job_id: job.job_id,
                        recovery: job.recovery,
                    });
                }
            }
            Err(e) => self.emit(WorkerEvent::Error {
                queue: self.queue.clone(),
                message: format!("failed to recover stalled jobs: {}", e),
            }),
        }

        if summary.promoted > 0 {
            debug!(worker = %self.worker_name, queue_name = %self.queue, promoted = summary.promoted, "Promoted delayed jobs");
        }
        summary
    }

    pub fn spawn(self, trigger: ShutdownTrigger) -> ServiceHandle {
        let name = format!("scheduler:{}", self.queue);
        let (stop, token) = shutdown_channel();
        let worker = self.worker_name.clone();
        let span = worker_span(&worker);
        let join = spawn_supervised(name.clone(), self.run(token).instrument(span), trigger);
        ServiceHandle::new(name, worker, stop, join)
    }

    pub async fn run(self, mut shutdown: ShutdownToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            worker = %self.worker_name,
            queue_name = %self.queue,
            interval_ms = self.interval.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
        info!(worker = %self.worker_name, queue_name = %self.queue, "Scheduler closed");
    }

    fn emit(&self, event: WorkerEvent) {
        let _ = self.events.send(event);
    }
}
