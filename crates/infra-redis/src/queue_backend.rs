// Redis QueueBackend Implementation

use async_trait::async_trait;
use clarity_core::application::retry::{RetryDecision, RetryPolicy};
use clarity_core::application::worker::constants::{
    DEFAULT_LOCK_DURATION, DEFAULT_MAX_STALLED_COUNT, PROMOTE_BATCH_LIMIT,
};
use clarity_core::domain::{Job, JobId, JobState, NewJob, QueueCounts};
use clarity_core::error::{AppError, Result};
use clarity_core::port::{
    FailureDisposition, IdProvider, QueueBackend, StallRecovery, StalledJob, TimeProvider,
};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::connection::map_redis_error;
use crate::keys::QueueKeys;
use crate::scripts::Scripts;

/// Entries kept in the completed list
const COMPLETED_KEEP: isize = 1000;
/// Entries kept in the failed list
const FAILED_KEEP: isize = 5000;
/// How long finished documents stay readable
const COMPLETED_RETENTION_MS: u64 = 24 * 60 * 60 * 1000;
const FAILED_RETENTION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Recorded on jobs whose lock expired too many times
const STALLED_TOO_OFTEN: &str = "job stalled more than allowable limit";

pub struct RedisQueueBackend {
    conn: ConnectionManager,
    scripts: Scripts,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    retry_policy: RetryPolicy,
    lock_duration: Duration,
    max_stalled_count: u32,
}

impl RedisQueueBackend {
    pub fn new(
        conn: ConnectionManager,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            conn,
            scripts: Scripts::new(),
            id_provider,
            time_provider,
            retry_policy: RetryPolicy::default(),
            lock_duration: DEFAULT_LOCK_DURATION,
            max_stalled_count: DEFAULT_MAX_STALLED_COUNT,
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }

    fn lock_millis(&self) -> u64 {
        self.lock_duration.as_millis() as u64
    }

    async fn load_job(&self, keys: &QueueKeys, id: &str) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let doc: Option<String> = conn.get(keys.job(id)).await.map_err(map_redis_error)?;
        doc.as_deref().map(decode_job).transpose()
    }

    /// Record the failure reason on a job the stall check moved to failed
    async fn mark_stalled_failed(&self, keys: &QueueKeys, id: &str) -> Result<()> {
        let Some(mut job) = self.load_job(keys, id).await? else {
            return Ok(());
        };
        let now = self.time_provider.now_millis();
        job.failed_reason = Some(STALLED_TOO_OFTEN.to_string());
        job.finished_at = Some(now);
        job.fail();

        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(keys.job(id))
            .arg(encode_job(&job)?)
            .arg("PX")
            .arg(FAILED_RETENTION_MS)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

/// Where a finished job document goes
enum Finish {
    Move {
        doc: String,
        target: String,
        retention_ms: u64,
        keep: isize,
    },
    Retry {
        doc: String,
        run_at: i64,
    },
}

impl RedisQueueBackend {
    /// Release the lock and move the job in one script, only while `token`
    /// still holds the lock
    async fn finish(&self, keys: &QueueKeys, job: &Job, token: &str, finish: Finish) -> Result<()> {
        let mut invocation = self.scripts.finish.prepare_invoke();
        invocation
            .key(keys.lock(&job.id))
            .key(keys.active())
            .key(keys.stalled())
            .key(keys.job(&job.id))
            .arg(token)
            .arg(&job.id);
        match finish {
            Finish::Move {
                doc,
                target,
                retention_ms,
                keep,
            } => {
                invocation
                    .key(target)
                    .arg(doc)
                    .arg("finish")
                    .arg(retention_ms)
                    .arg(keep);
            }
            Finish::Retry { doc, run_at } => {
                invocation.key(keys.delayed()).arg(doc).arg("retry").arg(run_at);
            }
        }

        let mut conn = self.conn.clone();
        let owned: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        if owned == 0 {
            debug!(queue_name = %job.queue, job_id = %job.id, "Finish rejected, lock not held");
            return Err(AppError::LockLost(job.id.clone()));
        }
        Ok(())
    }
}

pub(crate) fn encode_job(job: &Job) -> Result<String> {
    Ok(serde_json::to_string(job)?)
}

pub(crate) fn decode_job(doc: &str) -> Result<Job> {
    Ok(serde_json::from_str(doc)?)
}

/// Pair up the flat `id, outcome, id, outcome...` reply of the stall script
fn parse_stalled(reply: Vec<String>) -> Result<Vec<StalledJob>> {
    reply
        .chunks(2)
        .map(|pair| match pair {
            [id, outcome] => {
                let recovery = match outcome.as_str() {
                    "requeued" => StallRecovery::Requeued,
                    "failed" => StallRecovery::Failed,
                    other => {
                        return Err(AppError::Backend(format!(
                            "unexpected stall outcome '{}'",
                            other
                        )))
                    }
                };
                Ok(StalledJob {
                    job_id: id.clone(),
                    recovery,
                })
            }
            _ => Err(AppError::Backend("odd-length stall reply".to_string())),
        })
        .collect()
}

#[async_trait]
impl QueueBackend for RedisQueueBackend {
    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn enqueue(&self, queue: &str, req: NewJob) -> Result<JobId> {
        let keys = QueueKeys::new(queue);
        let id = self.id_provider.generate_id();
        let now = self.time_provider.now_millis();
        let delay_ms = req.delay_ms;
        let job = Job::from_request(id.clone(), now, queue, req);

        let mut pipe = redis::pipe();
        pipe.atomic().set(keys.job(&id), encode_job(&job)?).ignore();
        if delay_ms > 0 {
            pipe.zadd(keys.delayed(), &id, now + delay_ms as i64).ignore();
        } else {
            pipe.lpush(keys.wait(), &id).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await.map_err(map_redis_error)?;

        debug!(queue_name = %queue, job_id = %id, delay_ms, "Job enqueued");
        Ok(id)
    }

    async fn reserve(&self, queue: &str, token: &str) -> Result<Option<Job>> {
        let keys = QueueKeys::new(queue);
        let mut conn = self.conn.clone();

        let doc: Option<String> = self
            .scripts
            .reserve
            .key(keys.wait())
            .key(keys.active())
            .arg(keys.job_prefix())
            .arg(token)
            .arg(self.lock_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        let Some(doc) = doc else {
            return Ok(None);
        };

        let mut job = decode_job(&doc)?;
        if job.state == JobState::Active {
            // Requeued by stall recovery; the script does not rewrite documents
            job.state = JobState::Waiting;
        }
        job.start(self.time_provider.now_millis())?;

        let _: () = conn
            .set(keys.job(&job.id), encode_job(&job)?)
            .await
            .map_err(map_redis_error)?;
        Ok(Some(job))
    }

    fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    async fn extend_lock(&self, job: &Job, token: &str) -> Result<bool> {
        let keys = QueueKeys::new(&job.queue);
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .scripts
            .extend_lock
            .key(keys.lock(&job.id))
            .arg(token)
            .arg(self.lock_millis())
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(extended == 1)
    }

    async fn complete(&self, job: &Job, token: &str, result: &serde_json::Value) -> Result<()> {
        let keys = QueueKeys::new(&job.queue);
        let mut doc = job.clone();
        doc.complete(self.time_provider.now_millis(), result.clone())?;

        self.finish(
            &keys,
            job,
            token,
            Finish::Move {
                doc: encode_job(&doc)?,
                target: keys.completed(),
                retention_ms: COMPLETED_RETENTION_MS,
                keep: COMPLETED_KEEP,
            },
        )
        .await
    }

    async fn fail(&self, job: &Job, token: &str, reason: &str) -> Result<FailureDisposition> {
        let keys = QueueKeys::new(&job.queue);
        let now = self.time_provider.now_millis();
        let mut doc = job.clone();
        doc.record_failure(now, reason);

        let (finish, disposition) = match self.retry_policy.should_retry(&doc) {
            RetryDecision::Retry(delay_ms) => {
                doc.schedule_retry();
                let finish = Finish::Retry {
                    doc: encode_job(&doc)?,
                    run_at: now + delay_ms as i64,
                };
                (finish, FailureDisposition::Retrying { delay_ms })
            }
            RetryDecision::Failed => {
                doc.fail();
                let finish = Finish::Move {
                    doc: encode_job(&doc)?,
                    target: keys.failed(),
                    retention_ms: FAILED_RETENTION_MS,
                    keep: FAILED_KEEP,
                };
                (finish, FailureDisposition::Exhausted)
            }
        };

        self.finish(&keys, job, token, finish).await?;
        Ok(disposition)
    }

    async fn promote_delayed(&self, queue: &str) -> Result<usize> {
        let keys = QueueKeys::new(queue);
        let mut conn = self.conn.clone();
        let promoted: usize = self
            .scripts
            .promote
            .key(keys.delayed())
            .key(keys.wait())
            .arg(self.time_provider.now_millis())
            .arg(PROMOTE_BATCH_LIMIT)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(promoted)
    }

    async fn recover_stalled(&self, queue: &str) -> Result<Vec<StalledJob>> {
        let keys = QueueKeys::new(queue);
        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .scripts
            .recover_stalled
            .key(keys.active())
            .key(keys.wait())
            .key(keys.failed())
            .key(keys.stalled())
            .arg(keys.job_prefix())
            .arg(self.max_stalled_count)
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        let stalled = parse_stalled(reply)?;
        for job in stalled.iter().filter(|j| j.recovery == StallRecovery::Failed) {
            warn!(queue_name = %queue, job_id = %job.job_id, "Job exceeded stall limit");
            self.mark_stalled_failed(&keys, &job.job_id).await?;
        }
        Ok(stalled)
    }

    async fn counts(&self, queue: &str) -> Result<QueueCounts> {
        let keys = QueueKeys::new(queue);
        let mut conn = self.conn.clone();
        let (waiting, active, delayed, completed, failed): (u64, u64, u64, u64, u64) = redis::pipe()
            .llen(keys.wait())
            .llen(keys.active())
            .zcard(keys.delayed())
            .llen(keys.completed())
            .llen(keys.failed())
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(QueueCounts {
            waiting,
            active,
            delayed,
            completed,
            failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clarity_core::domain::JobPayload;
    use serde_json::json;

    #[test]
    fn test_job_document_round_trip_keeps_camel_case() {
        let mut job = Job::new("j-1", 1_000, "email", "send-digest", JobPayload::new(json!({"userId": 7})));
        job.attempts_made = 2;
        let doc = encode_job(&job).unwrap();
        assert!(doc.contains("\"attemptsMade\":2"));
        assert!(doc.contains("\"state\":\"waiting\""));

        let decoded = decode_job(&doc).unwrap();
        assert_eq!(decoded.id, "j-1");
        assert_eq!(decoded.attempts_made, 2);
        assert_eq!(decoded.payload.as_value()["userId"], 7);
    }

    #[test]
    fn test_corrupt_document_is_serialization_error() {
        assert!(matches!(decode_job("{not json"), Err(AppError::Serialization(_))));
    }

    #[test]
    fn test_parse_stalled_reply() {
        let reply = vec![
            "a".to_string(),
            "requeued".to_string(),
            "b".to_string(),
            "failed".to_string(),
        ];
        let parsed = parse_stalled(reply).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].recovery, StallRecovery::Requeued);
        assert_eq!(parsed[1].job_id, "b");
        assert_eq!(parsed[1].recovery, StallRecovery::Failed);
    }

    #[test]
    fn test_parse_stalled_rejects_garbage() {
        assert!(parse_stalled(vec!["a".to_string()]).is_err());
        assert!(parse_stalled(vec!["a".to_string(), "exploded".to_string()]).is_err());
    }
}
