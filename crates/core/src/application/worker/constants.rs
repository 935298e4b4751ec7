// Worker constants (no magic values in the loops)
use std::time::Duration;

/// Sleep duration when a queue has no ready job (100ms)
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep duration after a backend error before polling again (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default jobs in flight per queue
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default port of the health/metrics/status server
pub const DEFAULT_HEALTH_PORT: u16 = 3001;

/// Default hard limit for the shutdown drain (30s)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry base delay (1000ms = 1s)
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

/// Exponential backoff multiplier between attempts
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Reservation lock lifetime; consumers renew at half of it
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(30);

/// Times a job may lose its lock before it is failed instead of requeued
pub const DEFAULT_MAX_STALLED_COUNT: u32 = 1;

/// How often the scheduler companion promotes delayed jobs and checks for stalls
pub const SCHEDULER_INTERVAL: Duration = Duration::from_secs(5);

/// Delayed jobs moved per scheduler tick
pub const PROMOTE_BATCH_LIMIT: usize = 200;
