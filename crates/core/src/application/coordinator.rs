// Shutdown Coordinator - Running -> Draining -> Closed | TimedOut

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::application::pool::WorkerPool;
use crate::application::state::WorkerRuntimeState;
use crate::application::worker::ServiceHandle;

/// Why the worker is going down
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGTERM / SIGINT
    Signal(&'static str),
    /// A supervised task panicked
    Panic { task: String, message: String },
    /// Unrecoverable runtime error
    Fatal(String),
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(name) => write!(f, "signal {}", name),
            ShutdownReason::Panic { task, message } => write!(f, "panic in {}: {}", task, message),
            ShutdownReason::Fatal(message) => write!(f, "fatal error: {}", message),
        }
    }
}

/// How the drain ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Clean {
        processed: u64,
        failed: u64,
        uptime_secs: u64,
    },
    TimedOut { timeout: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub reason: ShutdownReason,
    pub outcome: ShutdownOutcome,
}

impl ShutdownReport {
    /// 0 only for a clean drain started by a signal
    pub fn exit_code(&self) -> i32 {
        match (&self.outcome, &self.reason) {
            (ShutdownOutcome::TimedOut { .. }, _) => 1,
            (_, ShutdownReason::Panic { .. } | ShutdownReason::Fatal(_)) => 1,
            (ShutdownOutcome::Clean { .. }, ShutdownReason::Signal(_)) => 0,
        }
    }
}

/// Cloneable handle that starts the shutdown sequence
///
/// Only the first `fire` has an effect; later calls are logged no-ops.
#[derive(Clone)]
pub struct ShutdownTrigger {
    state: Arc<WorkerRuntimeState>,
    tx: mpsc::UnboundedSender<ShutdownReason>,
}

impl ShutdownTrigger {
    /// Set the shutting-down flag and wake the coordinator
    ///
    /// Returns false when a shutdown was already in progress.
    pub fn fire(&self, reason: ShutdownReason) -> bool {
        if !self.state.begin_shutdown() {
            warn!(
                worker = %self.state.worker_name(),
                reason = %reason,
                "Shutdown already in progress, ignoring"
            );
            return false;
        }
        info!(worker = %self.state.worker_name(), reason = %reason, "Shutdown initiated");
        let _ = self.tx.send(reason);
        true
    }

    pub fn worker_name(&self) -> &str {
        self.state.worker_name()
    }

    pub fn is_fired(&self) -> bool {
        self.state.is_shutting_down()
    }
}

pub struct ShutdownCoordinator {
    state: Arc<WorkerRuntimeState>,
    timeout: Duration,
    trigger: ShutdownTrigger,
    rx: mpsc::UnboundedReceiver<ShutdownReason>,
}

impl ShutdownCoordinator {
    pub fn new(state: Arc<WorkerRuntimeState>, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let trigger = ShutdownTrigger {
            state: Arc::clone(&state),
            tx,
        };
        Self {
            state,
            timeout,
            trigger,
            rx,
        }
    }

    pub fn trigger(&self) -> ShutdownTrigger {
        self.trigger.clone()
    }

    /// Wait for the first trigger
    pub async fn wait_for_trigger(&mut self) -> ShutdownReason {
        match self.rx.recv().await {
            Some(reason) => reason,
            // Unreachable while `self.trigger` holds a sender
            None => ShutdownReason::Fatal("shutdown channel closed".to_string()),
        }
    }

    /// Drain everything within the timeout
    ///
    /// Order: HTTP server, then all consumers concurrently (in-flight jobs
    /// finish), then all schedulers concurrently, then the event aggregator so
    /// the final counters include every job.
    pub async fn drain(
        &self,
        reason: ShutdownReason,
        http: Option<ServiceHandle>,
        mut pool: WorkerPool,
        aggregator: JoinHandle<()>,
    ) -> ShutdownReport {
        info!(
            worker = %self.state.worker_name(),
            timeout_ms = self.timeout.as_millis() as u64,
            "Draining worker"
        );

        let drain = async {
            if let Some(http) = http {
                http.close().await;
            }
            pool.close_consumers().await;
            pool.close_schedulers().await;
            if let Err(e) = aggregator.await {
                error!(worker = %self.state.worker_name(), error = %e, "Event aggregator ended abnormally");
            }
        };

        let outcome = match tokio::time::timeout(self.timeout, drain).await {
            Ok(()) => {
                let stats = self.state.snapshot();
                info!(
                    worker = %self.state.worker_name(),
                    processed = stats.processed,
                    failed = stats.failed,
                    uptime_secs = stats.uptime_secs,
                    "Worker shut down cleanly"
                );
                ShutdownOutcome::Clean {
                    processed: stats.processed,
                    failed: stats.failed,
                    uptime_secs: stats.uptime_secs,
                }
            }
            Err(_) => {
                let stats = self.state.snapshot();
                error!(
                    worker = %self.state.worker_name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    active = stats.active,
                    "Shutdown timeout exceeded, forcing exit"
                );
                ShutdownOutcome::TimedOut {
                    timeout: self.timeout,
                }
            }
        };

        ShutdownReport { reason, outcome }
    }

    /// Wait for a trigger, then drain
    pub async fn run(
        mut self,
        http: Option<ServiceHandle>,
        pool: WorkerPool,
        aggregator: JoinHandle<()>,
    ) -> ShutdownReport {
        let reason = self.wait_for_trigger().await;
        self.drain(reason, http, pool, aggregator).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::time_provider::SystemTimeProvider;

    fn state() -> Arc<WorkerRuntimeState> {
        Arc::new(WorkerRuntimeState::new("coord-test", Arc::new(SystemTimeProvider)))
    }

    #[tokio::test]
    async fn test_second_trigger_is_a_noop() {
        let mut coordinator = ShutdownCoordinator::new(state(), Duration::from_secs(1));
        let trigger = coordinator.trigger();

        assert!(trigger.fire(ShutdownReason::Signal("SIGTERM")));
        assert!(!trigger.fire(ShutdownReason::Signal("SIGINT")));
        assert!(trigger.is_fired());

        assert_eq!(coordinator.wait_for_trigger().await, ShutdownReason::Signal("SIGTERM"));
        assert!(coordinator.rx.try_recv().is_err(), "second trigger must not queue a drain");
    }

    #[test]
    fn test_exit_codes() {
        let clean = ShutdownOutcome::Clean {
            processed: 1,
            failed: 0,
            uptime_secs: 3,
        };
        let report = |reason, outcome| ShutdownReport { reason, outcome };

        assert_eq!(report(ShutdownReason::Signal("SIGTERM"), clean.clone()).exit_code(), 0);
        assert_eq!(
            report(
                ShutdownReason::Signal("SIGTERM"),
                ShutdownOutcome::TimedOut {
                    timeout: Duration::from_secs(1)
                }
            )
            .exit_code(),
            1
        );
        assert_eq!(
            report(
                ShutdownReason::Panic {
                    task: "consumer:email".into(),
                    message: "boom".into()
                },
                clean
            )
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(ShutdownReason::Signal("SIGINT").to_string(), "signal SIGINT");
        assert_eq!(
            ShutdownReason::Fatal("redis gone".into()).to_string(),
            "fatal error: redis gone"
        );
    }
}
