// Process-wide runtime state: counters, queue statuses, shutdown flag

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

use crate::domain::QueueStatus;
use crate::port::TimeProvider;

/// In-memory worker state shared by the event aggregator, the HTTP handlers
/// and the shutdown coordinator
///
/// Counters are written only by the aggregator. Readers never block writers.
/// Nothing here is persisted; the queue backend is the system of record.
pub struct WorkerRuntimeState {
    worker_name: String,
    started_at: i64,
    time_provider: Arc<dyn TimeProvider>,
    processed: AtomicU64,
    failed: AtomicU64,
    active: AtomicU64,
    /// Millis since epoch, 0 = no activity yet
    last_activity: AtomicI64,
    shutting_down: AtomicBool,
    queues: RwLock<Vec<(String, QueueStatus)>>,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub failed: u64,
    pub active: u64,
    pub last_activity: Option<i64>,
    pub uptime_secs: u64,
    pub started_at: i64,
    pub shutting_down: bool,
}

impl StatsSnapshot {
    /// Share of finished jobs that succeeded, `"N/A"` before any finished
    pub fn success_rate(&self) -> String {
        let finished = self.processed + self.failed;
        if finished == 0 {
            return "N/A".to_string();
        }
        format!("{:.2}%", self.processed as f64 / finished as f64 * 100.0)
    }
}

impl WorkerRuntimeState {
    pub fn new(worker_name: impl Into<String>, time_provider: Arc<dyn TimeProvider>) -> Self {
        let started_at = time_provider.now_millis();
        Self {
            worker_name: worker_name.into(),
            started_at,
            time_provider,
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            active: AtomicU64::new(0),
            last_activity: AtomicI64::new(0),
            shutting_down: AtomicBool::new(false),
            queues: RwLock::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------
    // Writers (event aggregator, pool, coordinator)
    // ------------------------------------------------------------------

    pub(crate) fn record_active(&self) {
        self.active.fetch_add(1, Ordering::SeqCst);
        self.record_activity();
    }

    pub(crate) fn record_completed(&self) {
        self.processed.fetch_add(1, Ordering::SeqCst);
        self.release_active();
        self.record_activity();
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.release_active();
        self.record_activity();
    }

    pub(crate) fn record_activity(&self) {
        self.last_activity
            .store(self.time_provider.now_millis(), Ordering::SeqCst);
    }

    /// Decrement `active`, never below zero
    fn release_active(&self) {
        let released = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if released.is_err() {
            warn!(worker = %self.worker_name, "Job finished without a matching activation");
        }
    }

    /// Flip the shutting-down flag; true only for the first caller
    pub(crate) fn begin_shutdown(&self) -> bool {
        !self.shutting_down.swap(true, Ordering::SeqCst)
    }

    pub fn register_queue(&self, queue: &str) {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        if !queues.iter().any(|(name, _)| name == queue) {
            queues.push((queue.to_string(), QueueStatus::Active));
        }
    }

    pub fn mark_all_closing(&self) {
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        for (_, status) in queues.iter_mut() {
            *status = QueueStatus::Closing;
        }
    }

    // ------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------

    pub fn worker_name(&self) -> &str {
        &self.worker_name
    }

    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    pub fn has_consumers(&self) -> bool {
        !self
            .queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }

    /// Queue statuses in configuration order
    pub fn queue_statuses(&self) -> Vec<(String, QueueStatus)> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queue_statuses().into_iter().map(|(name, _)| name).collect()
    }

    pub fn now_millis(&self) -> i64 {
        self.time_provider.now_millis()
    }

    pub fn uptime_secs(&self) -> u64 {
        let elapsed = self.time_provider.now_millis() - self.started_at;
        (elapsed.max(0) / 1000) as u64
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last_activity = self.last_activity.load(Ordering::SeqCst);
        StatsSnapshot {
            processed: self.processed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            active: self.active.load(Ordering::SeqCst),
            last_activity: (last_activity > 0).then_some(last_activity),
            uptime_secs: self.uptime_secs(),
            started_at: self.started_at,
            shutting_down: self.is_shutting_down(),
        }
    }
}
