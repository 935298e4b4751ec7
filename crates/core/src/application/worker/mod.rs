// Worker - per-queue consume loop

pub mod constants;
mod panic_guard;
mod shutdown;

use constants::*;
pub use panic_guard::{guard, is_guarded, panic_message, PanicGuardResult};
pub use shutdown::{shutdown_channel, spawn_supervised, ServiceHandle, ShutdownSender, ShutdownToken};

use crate::application::coordinator::ShutdownTrigger;
use crate::application::events::{EventSender, WorkerEvent};
use crate::domain::Job;
use crate::error::AppError;
use crate::port::{JobProcessor, QueueBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

/// Span carried by every task of one worker, so adapter log lines inherit the name
pub fn worker_span(worker_name: &str) -> Span {
    info_span!("worker", worker = %worker_name)
}

/// Lower bound for the lock renewal period
const MIN_LOCK_RENEWAL: Duration = Duration::from_millis(10);

/// Consumer bound to one queue and one processor
///
/// Pulls ready jobs while fewer than `concurrency` are running. A slot is
/// freed only after the processor finished and the backend recorded the
/// outcome. Closing stops intake and waits for every in-flight job.
pub struct QueueConsumer {
    runner: Arc<JobRunner>,
    concurrency: usize,
}

/// Everything a single job execution needs, shared by in-flight tasks
struct JobRunner {
    queue: String,
    worker_name: String,
    lock_token: String,
    backend: Arc<dyn QueueBackend>,
    processor: Arc<dyn JobProcessor>,
    events: EventSender,
}

impl QueueConsumer {
    pub fn new(
        queue: impl Into<String>,
        worker_name: &str,
        backend: Arc<dyn QueueBackend>,
        processor: Arc<dyn JobProcessor>,
        concurrency: usize,
        events: EventSender,
    ) -> Self {
        let queue = queue.into();
        Self {
            runner: Arc::new(JobRunner {
                lock_token: format!("{}:{}", worker_name, queue),
                worker_name: worker_name.to_string(),
                queue,
                backend,
                processor,
                events,
            }),
            concurrency: concurrency.max(1),
        }
    }

    pub fn queue(&self) -> &str {
        &self.runner.queue
    }

    /// Run on the runtime; a panic in the loop fires `trigger`
    pub fn spawn(self, trigger: ShutdownTrigger) -> ServiceHandle {
        let name = format!("consumer:{}", self.runner.queue);
        let (stop, token) = shutdown_channel();
        let worker = self.runner.worker_name.clone();
        let span = worker_span(&worker);
        let join = spawn_supervised(name.clone(), self.run(token).instrument(span), trigger);
        ServiceHandle::new(name, worker, stop, join)
    }

    /// Consume until shutdown, then drain in-flight jobs
    pub async fn run(self, mut shutdown: ShutdownToken) {
        let queue = self.runner.queue.clone();
        let worker = self.runner.worker_name.clone();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        info!(
            worker = %worker,
            queue_name = %queue,
            processor = self.runner.processor.name(),
            concurrency = self.concurrency,
            "Consumer started"
        );
        self.runner.emit(WorkerEvent::Ready { queue: queue.clone() });

        loop {
            reap(&mut in_flight, &worker, &queue);

            // Wait for a free slot
            let permit = tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if shutdown.is_shutdown() {
                break;
            }

            match self.runner.backend.reserve(&queue, &self.runner.lock_token).await {
                Ok(Some(job)) => {
                    let runner = Arc::clone(&self.runner);
                    in_flight.spawn(
                        async move {
                            runner.execute(job).await;
                            drop(permit);
                        }
                        .in_current_span(),
                    );
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = sleep(IDLE_POLL_INTERVAL) => {},
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    drop(permit);
                    self.runner.emit(WorkerEvent::Error {
                        queue: queue.clone(),
                        message: format!("failed to fetch next job: {}", e),
                    });
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(worker = %worker, queue_name = %queue, in_flight = in_flight.len(), "Waiting for in-flight jobs");
        }
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                error!(worker = %worker, queue_name = %queue, error = %e, "Job task ended abnormally");
            }
        }
        info!(worker = %worker, queue_name = %queue, "Consumer closed");
    }
}

/// Collect finished job tasks without waiting
fn reap(in_flight: &mut JoinSet<()>, worker: &str, queue: &str) {
    while let Some(result) = in_flight.try_join_next() {
        if let Err(e) = result {
            error!(worker = %worker, queue_name = %queue, error = %e, "Job task ended abnormally");
        }
    }
}

impl JobRunner {
    fn emit(&self, event: WorkerEvent) {
        if self.events.send(event).is_err() {
            debug!(worker = %self.worker_name, queue_name = %self.queue, "Event aggregator gone, event dropped");
        }
    }

    /// Run one reserved job and report the outcome to the backend
    async fn execute(&self, job: Job) {
        self.emit(WorkerEvent::Active {
            queue: self.queue.clone(),
            job_id: job.id.clone(),
            job_name: job.name.clone(),
            attempts_made: job.attempts_made,
        });

        let started = Instant::now();
        let outcome = self.process_with_lock_renewal(&job).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(value) => {
                match self.backend.complete(&job, &self.lock_token, &value).await {
                    Ok(()) => {}
                    Err(AppError::LockLost(_)) => self.warn_lock_lost(&job),
                    Err(e) => self.emit(WorkerEvent::Error {
                        queue: self.queue.clone(),
                        message: format!("failed to record completion of job {}: {}", job.id, e),
                    }),
                }
                self.emit(WorkerEvent::Completed {
                    queue: self.queue.clone(),
                    job_id: job.id,
                    job_name: job.name,
                    duration_ms,
                });
            }
            Err(reason) => {
                let disposition = match self.backend.fail(&job, &self.lock_token, &reason).await {
                    Ok(disposition) => Some(disposition),
                    Err(AppError::LockLost(_)) => {
                        self.warn_lock_lost(&job);
                        None
                    }
                    Err(e) => {
                        self.emit(WorkerEvent::Error {
                            queue: self.queue.clone(),
                            message: format!("failed to record failure of job {}: {}", job.id, e),
                        });
                        None
                    }
                };
                self.emit(WorkerEvent::Failed {
                    queue: self.queue.clone(),
                    job_id: job.id,
                    job_name: job.name,
                    error: reason,
                    attempts_made: job.attempts_made + 1,
                    disposition,
                });
            }
        }
    }

    /// Another holder owns the job now; its outcome stays with that holder
    fn warn_lock_lost(&self, job: &Job) {
        warn!(
            worker = %self.worker_name,
            queue_name = %self.queue,
            job_id = %job.id,
            "Job lock lost before the outcome was recorded, outcome discarded"
        );
    }

    /// Run the processor, renewing the reservation lock at half its lifetime
    async fn process_with_lock_renewal(&self, job: &Job) -> Result<serde_json::Value, String> {
        let period = (self.backend.lock_duration() / 2).max(MIN_LOCK_RENEWAL);
        let mut renewal = interval_at(Instant::now() + period, period);
        renewal.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let work = guard(self.processor.process(job));
        tokio::pin!(work);

        loop {
            tokio::select! {
                result = &mut work => {
                    return match result {
                        PanicGuardResult::Success(Ok(value)) => Ok(value),
                        PanicGuardResult::Success(Err(e)) => Err(e.to_string()),
                        PanicGuardResult::Panicked(msg) => {
                            error!(worker = %self.worker_name, queue_name = %self.queue, job_id = %job.id, panic_msg = %msg, "Processor panicked");
                            Err(format!("processor panicked: {}", msg))
                        }
                    };
                }
                _ = renewal.tick() => {
                    match self.backend.extend_lock(job, &self.lock_token).await {
                        Ok(true) => {}
                        Ok(false) => warn!(worker = %self.worker_name, queue_name = %self.queue, job_id = %job.id, "Job lock lost"),
                        Err(e) => warn!(worker = %self.worker_name, queue_name = %self.queue, job_id = %job.id, error = %e, "Failed to extend job lock"),
                    }
                }
            }
        }
    }
}
