// Queue Backend Port (Interface)
// The backend is the system of record for jobs: lists, locks, retries.

use crate::domain::{Job, JobId, NewJob, QueueCounts};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// What the backend did with a failed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Moved to the delayed set, eligible again after `delay_ms`
    Retrying { delay_ms: u64 },
    /// No attempts left, moved to the failed list
    Exhausted,
}

/// What the scheduler did with a job whose lock expired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallRecovery {
    Requeued,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledJob {
    pub job_id: JobId,
    pub recovery: StallRecovery,
}

/// Queue backend interface
///
/// Implementations:
/// - RedisQueueBackend: production, shared multiplexed connection
/// - InMemoryQueueBackend: tests
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Check connectivity
    async fn ping(&self) -> Result<()>;

    /// Add a job to a queue (waiting, or delayed when `delay_ms > 0`)
    async fn enqueue(&self, queue: &str, job: NewJob) -> Result<JobId>;

    /// Atomically move the next waiting job to active and lock it for `token`
    async fn reserve(&self, queue: &str, token: &str) -> Result<Option<Job>>;

    /// How long a reservation lock lives without renewal
    fn lock_duration(&self) -> Duration;

    /// Renew the lock of a running job; false when the lock was lost
    async fn extend_lock(&self, job: &Job, token: &str) -> Result<bool>;

    /// Record success and move the job to the completed list
    ///
    /// `AppError::LockLost` when `token` no longer owns the job; nothing is
    /// written in that case.
    async fn complete(&self, job: &Job, token: &str, result: &serde_json::Value) -> Result<()>;

    /// Record a failed attempt and apply the retry policy
    ///
    /// Same ownership rule as `complete`.
    async fn fail(&self, job: &Job, token: &str, reason: &str) -> Result<FailureDisposition>;

    /// Move delayed jobs whose time has come back to waiting
    async fn promote_delayed(&self, queue: &str) -> Result<usize>;

    /// Requeue (or fail) active jobs whose lock expired
    async fn recover_stalled(&self, queue: &str) -> Result<Vec<StalledJob>>;

    /// Current list sizes
    async fn counts(&self, queue: &str) -> Result<QueueCounts>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::AppError;
    use crate::application::retry::{RetryDecision, RetryPolicy};
    use crate::application::worker::constants::{DEFAULT_LOCK_DURATION, DEFAULT_MAX_STALLED_COUNT};
    use crate::domain::JobState;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::{IdProvider, TimeProvider};
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    /// Message recorded on jobs that stall too often
    pub const STALLED_TOO_OFTEN: &str = "job stalled more than allowable limit";

    #[derive(Default)]
    struct QueueLists {
        wait: VecDeque<JobId>,
        active: Vec<JobId>,
        delayed: Vec<(i64, JobId)>,
        completed: Vec<JobId>,
        failed: Vec<JobId>,
        locks: HashMap<JobId, (String, i64)>,
        stalls: HashMap<JobId, u32>,
    }

    impl QueueLists {
        /// Live lock held by `token`
        fn owns(&self, id: &str, token: &str, now: i64) -> bool {
            matches!(self.locks.get(id), Some((owner, until)) if owner == token && *until > now)
        }

        fn release(&mut self, id: &str) {
            self.active.retain(|a| a != id);
            self.locks.remove(id);
            self.stalls.remove(id);
        }
    }

    #[derive(Default)]
    struct Inner {
        queues: HashMap<String, QueueLists>,
        jobs: HashMap<JobId, Job>,
    }

    /// In-memory queue backend with the same list/lock/retry semantics as Redis
    pub struct InMemoryQueueBackend {
        inner: Mutex<Inner>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
        retry_policy: RetryPolicy,
        lock_duration: Duration,
        max_stalled_count: u32,
    }

    impl Default for InMemoryQueueBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl InMemoryQueueBackend {
        pub fn new() -> Self {
            Self {
                inner: Mutex::new(Inner::default()),
                id_provider: Arc::new(SequentialIdProvider::default()),
                time_provider: Arc::new(SystemTimeProvider),
                retry_policy: RetryPolicy::default(),
                lock_duration: DEFAULT_LOCK_DURATION,
                max_stalled_count: DEFAULT_MAX_STALLED_COUNT,
            }
        }

        pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
            self.time_provider = time_provider;
            self
        }

        pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
            self.retry_policy = retry_policy;
            self
        }

        pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
            self.lock_duration = lock_duration;
            self
        }

        pub fn with_max_stalled_count(mut self, max_stalled_count: u32) -> Self {
            self.max_stalled_count = max_stalled_count;
            self
        }

        /// Stored copy of a job
        pub fn job(&self, id: &str) -> Option<Job> {
            self.lock().jobs.get(id).cloned()
        }

        fn lock(&self) -> MutexGuard<'_, Inner> {
            self.inner.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    #[async_trait]
    impl QueueBackend for InMemoryQueueBackend {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }

        async fn enqueue(&self, queue: &str, req: NewJob) -> Result<JobId> {
            let id = self.id_provider.generate_id();
            let now = self.time_provider.now_millis();
            let delay_ms = req.delay_ms;
            let job = Job::from_request(id.clone(), now, queue, req);

            let mut inner = self.lock();
            let lists = inner.queues.entry(queue.to_string()).or_default();
            if delay_ms > 0 {
                lists.delayed.push((now + delay_ms as i64, id.clone()));
            } else {
                lists.wait.push_back(id.clone());
            }
            inner.jobs.insert(id.clone(), job);
            Ok(id)
        }

        async fn reserve(&self, queue: &str, token: &str) -> Result<Option<Job>> {
            let now = self.time_provider.now_millis();
            let lock_until = now + self.lock_duration.as_millis() as i64;

            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(lists) = inner.queues.get_mut(queue) else {
                return Ok(None);
            };

            while let Some(id) = lists.wait.pop_front() {
                let Some(job) = inner.jobs.get_mut(&id) else {
                    continue; // document removed behind our back
                };
                job.start(now)?;
                lists.active.push(id.clone());
                lists.locks.insert(id, (token.to_string(), lock_until));
                return Ok(Some(job.clone()));
            }
            Ok(None)
        }

        fn lock_duration(&self) -> Duration {
            self.lock_duration
        }

        async fn extend_lock(&self, job: &Job, token: &str) -> Result<bool> {
            let lock_until = self.time_provider.now_millis() + self.lock_duration.as_millis() as i64;
            let mut inner = self.lock();
            let Some(lists) = inner.queues.get_mut(&job.queue) else {
                return Ok(false);
            };
            match lists.locks.get_mut(&job.id) {
                Some((owner, until)) if owner == token => {
                    *until = lock_until;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn complete(&self, job: &Job, token: &str, result: &serde_json::Value) -> Result<()> {
            let now = self.time_provider.now_millis();
            let mut doc = job.clone();
            doc.complete(now, result.clone())?;

            let mut inner = self.lock();
            let lists = inner.queues.entry(job.queue.clone()).or_default();
            if !lists.owns(&job.id, token, now) {
                return Err(AppError::LockLost(job.id.clone()));
            }
            lists.release(&job.id);
            lists.completed.push(job.id.clone());
            inner.jobs.insert(job.id.clone(), doc);
            Ok(())
        }

        async fn fail(&self, job: &Job, token: &str, reason: &str) -> Result<FailureDisposition> {
            let now = self.time_provider.now_millis();
            let mut doc = job.clone();
            doc.record_failure(now, reason);

            let mut inner = self.lock();
            let lists = inner.queues.entry(job.queue.clone()).or_default();
            if !lists.owns(&job.id, token, now) {
                return Err(AppError::LockLost(job.id.clone()));
            }
            lists.release(&job.id);

            let disposition = match self.retry_policy.should_retry(&doc) {
                RetryDecision::Retry(delay_ms) => {
                    doc.schedule_retry();
                    lists.delayed.push((now + delay_ms as i64, job.id.clone()));
                    FailureDisposition::Retrying { delay_ms }
                }
                RetryDecision::Failed => {
                    doc.fail();
                    lists.failed.push(job.id.clone());
                    FailureDisposition::Exhausted
                }
            };
            inner.jobs.insert(job.id.clone(), doc);
            Ok(disposition)
        }

        async fn promote_delayed(&self, queue: &str) -> Result<usize> {
            let now = self.time_provider.now_millis();
            let mut inner = self.lock();
            let Some(lists) = inner.queues.get_mut(queue) else {
                return Ok(0);
            };

            lists.delayed.sort_by_key(|(run_at, _)| *run_at);
            let due = lists.delayed.iter().take_while(|(run_at, _)| *run_at <= now).count();
            let promoted: Vec<(i64, JobId)> = lists.delayed.drain(..due).collect();
            for (_, id) in &promoted {
                lists.wait.push_back(id.clone());
            }
            Ok(promoted.len())
        }

        async fn recover_stalled(&self, queue: &str) -> Result<Vec<StalledJob>> {
            let now = self.time_provider.now_millis();
            let mut guard = self.lock();
            let inner = &mut *guard;
            let Some(lists) = inner.queues.get_mut(queue) else {
                return Ok(Vec::new());
            };

            let expired: Vec<JobId> = lists
                .active
                .iter()
                .filter(|id| match lists.locks.get(*id) {
                    Some((_, until)) => *until <= now,
                    None => true,
                })
                .cloned()
                .collect();

            let mut recovered = Vec::with_capacity(expired.len());
            for id in expired {
                lists.active.retain(|a| a != &id);
                lists.locks.remove(&id);
                let count = lists.stalls.entry(id.clone()).or_insert(0);
                *count += 1;

                let recovery = if *count > self.max_stalled_count {
                    lists.stalls.remove(&id);
                    lists.failed.push(id.clone());
                    if let Some(job) = inner.jobs.get_mut(&id) {
                        job.failed_reason = Some(STALLED_TOO_OFTEN.to_string());
                        job.finished_at = Some(now);
                        job.fail();
                    }
                    StallRecovery::Failed
                } else {
                    // Next out, ahead of newer work
                    lists.wait.push_front(id.clone());
                    if let Some(job) = inner.jobs.get_mut(&id) {
                        job.state = JobState::Waiting;
                    }
                    StallRecovery::Requeued
                };
                recovered.push(StalledJob {
                    job_id: id,
                    recovery,
                });
            }
            Ok(recovered)
        }

        async fn counts(&self, queue: &str) -> Result<QueueCounts> {
            let inner = self.lock();
            Ok(inner
                .queues
                .get(queue)
                .map(|lists| QueueCounts {
                    waiting: lists.wait.len() as u64,
                    active: lists.active.len() as u64,
                    delayed: lists.delayed.len() as u64,
                    completed: lists.completed.len() as u64,
                    failed: lists.failed.len() as u64,
                })
                .unwrap_or_default())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::port::time_provider::mocks::ManualTimeProvider;
        use serde_json::json;

        fn backend_with_clock() -> (InMemoryQueueBackend, Arc<ManualTimeProvider>) {
            let clock = Arc::new(ManualTimeProvider::new(1_000));
            let backend = InMemoryQueueBackend::new()
                .with_time_provider(clock.clone())
                .with_retry_policy(RetryPolicy::new(100, 2.0))
                .with_lock_duration(Duration::from_millis(500));
            (backend, clock)
        }

        #[tokio::test]
        async fn test_reserve_is_fifo_and_locks() {
            let (backend, _) = backend_with_clock();
            let first = backend.enqueue("email", NewJob::new("a", json!({}))).await.unwrap();
            let second = backend.enqueue("email", NewJob::new("b", json!({}))).await.unwrap();

            let job = backend.reserve("email", "w1").await.unwrap().unwrap();
            assert_eq!(job.id, first);
            assert_eq!(job.state, JobState::Active);
            assert!(backend.extend_lock(&job, "w1").await.unwrap());
            assert!(!backend.extend_lock(&job, "someone-else").await.unwrap());

            let job = backend.reserve("email", "w1").await.unwrap().unwrap();
            assert_eq!(job.id, second);
            assert!(backend.reserve("email", "w1").await.unwrap().is_none());

            let counts = backend.counts("email").await.unwrap();
            assert_eq!(counts.active, 2);
            assert_eq!(counts.waiting, 0);
        }

        #[tokio::test]
        async fn test_failure_retries_then_exhausts() {
            let (backend, clock) = backend_with_clock();
            let id = backend
                .enqueue("sync", NewJob::new("sync-account", json!({})).with_max_attempts(2))
                .await
                .unwrap();

            let job = backend.reserve("sync", "w").await.unwrap().unwrap();
            let disposition = backend.fail(&job, "w", "boom").await.unwrap();
            assert!(matches!(disposition, FailureDisposition::Retrying { .. }));
            assert_eq!(backend.counts("sync").await.unwrap().delayed, 1);

            // Not due yet
            assert_eq!(backend.promote_delayed("sync").await.unwrap(), 0);
            clock.advance(1_000);
            assert_eq!(backend.promote_delayed("sync").await.unwrap(), 1);

            let job = backend.reserve("sync", "w").await.unwrap().unwrap();
            assert_eq!(job.attempts_made, 1);
            let disposition = backend.fail(&job, "w", "boom again").await.unwrap();
            assert_eq!(disposition, FailureDisposition::Exhausted);

            let stored = backend.job(&id).unwrap();
            assert_eq!(stored.state, JobState::Failed);
            assert_eq!(stored.attempts_made, 2);
            assert_eq!(stored.failed_reason.as_deref(), Some("boom again"));
            assert_eq!(backend.counts("sync").await.unwrap().failed, 1);
        }

        #[tokio::test]
        async fn test_complete_records_result() {
            let (backend, _) = backend_with_clock();
            let id = backend.enqueue("cleanup", NewJob::new("purge", json!({}))).await.unwrap();
            let job = backend.reserve("cleanup", "w").await.unwrap().unwrap();
            backend.complete(&job, "w", &json!({"purged": 12})).await.unwrap();

            let stored = backend.job(&id).unwrap();
            assert_eq!(stored.state, JobState::Completed);
            assert_eq!(stored.return_value, Some(json!({"purged": 12})));
            let counts = backend.counts("cleanup").await.unwrap();
            assert_eq!(counts.completed, 1);
            assert_eq!(counts.active, 0);
        }

        #[tokio::test]
        async fn test_expired_lock_is_recovered_then_failed() {
            let (backend, clock) = backend_with_clock();
            let backend = backend.with_max_stalled_count(1);
            let id = backend.enqueue("webhook", NewJob::new("hook", json!({}))).await.unwrap();

            backend.reserve("webhook", "w").await.unwrap().unwrap();
            assert!(backend.recover_stalled("webhook").await.unwrap().is_empty());

            clock.advance(600);
            let stalled = backend.recover_stalled("webhook").await.unwrap();
            assert_eq!(
                stalled,
                vec![StalledJob {
                    job_id: id.clone(),
                    recovery: StallRecovery::Requeued
                }]
            );

            backend.reserve("webhook", "w").await.unwrap().unwrap();
            clock.advance(600);
            let stalled = backend.recover_stalled("webhook").await.unwrap();
            assert_eq!(stalled[0].recovery, StallRecovery::Failed);
            assert_eq!(backend.job(&id).unwrap().failed_reason.as_deref(), Some(STALLED_TOO_OFTEN));
        }

        #[tokio::test]
        async fn test_stale_holder_cannot_finish_requeued_job() {
            let (backend, clock) = backend_with_clock();
            let id = backend.enqueue("sync", NewJob::new("refresh", json!({}))).await.unwrap();

            let stale = backend.reserve("sync", "worker-a:sync").await.unwrap().unwrap();
            clock.advance(600);
            assert_eq!(
                backend.recover_stalled("sync").await.unwrap()[0].recovery,
                StallRecovery::Requeued
            );
            let fresh = backend.reserve("sync", "worker-b:sync").await.unwrap().unwrap();

            let err = backend
                .complete(&stale, "worker-a:sync", &json!({}))
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::LockLost(ref job_id) if job_id == &id));
            let err = backend.fail(&stale, "worker-a:sync", "late").await.unwrap_err();
            assert!(matches!(err, AppError::LockLost(_)));

            // The new holder is untouched
            assert!(backend.extend_lock(&fresh, "worker-b:sync").await.unwrap());
            let counts = backend.counts("sync").await.unwrap();
            assert_eq!(counts.active, 1);
            assert_eq!(counts.completed, 0);

            backend.complete(&fresh, "worker-b:sync", &json!({})).await.unwrap();
            let counts = backend.counts("sync").await.unwrap();
            assert_eq!(counts.completed, 1);
            assert_eq!(counts.active, 0);
        }

        #[tokio::test]
        async fn test_expired_lock_cannot_finish() {
            let (backend, clock) = backend_with_clock();
            backend.enqueue("email", NewJob::new("digest", json!({}))).await.unwrap();
            let job = backend.reserve("email", "w").await.unwrap().unwrap();

            clock.advance(600);
            assert!(matches!(
                backend.complete(&job, "w", &json!({})).await,
                Err(AppError::LockLost(_))
            ));
        }
    }
}
