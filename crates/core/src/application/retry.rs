// Retry policy applied by queue backends when a job fails
use crate::domain::Job;
use tracing::{info, warn};

use crate::application::worker::constants::{DEFAULT_BACKOFF_FACTOR, DEFAULT_RETRY_BASE_DELAY_MS};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the job (with backoff delay in ms)
    Retry(u64),
    /// Do not retry, job has failed permanently
    Failed,
}

/// Exponential backoff retry policy
///
/// Determines if a job should be retried based on:
/// - Attempts made so far (already including the failure being handled)
/// - Maximum attempts allowed by the job
/// - The job's own base delay, or the policy default
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    base_delay_ms: u64,
    backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_BACKOFF_FACTOR)
    }
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, backoff_factor: f64) -> Self {
        Self {
            base_delay_ms,
            backoff_factor,
        }
    }

    /// Determine if a failed job should be retried
    ///
    /// Backoff formula:
    /// delay = base_delay * (backoff_factor ^ (attempts_made - 1)) * jitter
    ///
    /// Jitter is ±10%, seeded from the job id so a given job always gets the
    /// same delay for the same attempt.
    pub fn should_retry(&self, job: &Job) -> RetryDecision {
        if !job.can_retry() {
            warn!(
                job_id = %job.id,
                attempts_made = job.attempts_made,
                max_attempts = job.max_attempts,
                "Max retry attempts reached"
            );
            return RetryDecision::Failed;
        }

        let base = job.backoff_ms.unwrap_or(self.base_delay_ms) as f64;
        let exponent = job.attempts_made.saturating_sub(1) as i32;
        let raw_delay = base * self.backoff_factor.powi(exponent);

        // Spread retries of jobs that failed together
        let jitter_seed = job.id.chars().map(|c| c as u32).sum::<u32>();
        let jitter_factor = 0.9 + ((jitter_seed % 21) as f64 / 100.0); // 0.9 to 1.1

        let delay_ms = (raw_delay * jitter_factor).round() as u64;

        info!(
            job_id = %job.id,
            attempts_made = job.attempts_made,
            max_attempts = job.max_attempts,
            delay_ms,
            "Scheduling retry"
        );

        RetryDecision::Retry(delay_ms)
    }
}
