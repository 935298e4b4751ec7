// Domain Layer - Jobs and queues as the worker sees them

pub mod error;
pub mod job;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use job::{Job, JobId, JobPayload, JobState, NewJob};
pub use queue::{
    QueueCounts, QueueId, QueueStatus, CLEANUP_QUEUE, DEFAULT_QUEUES, EMAIL_QUEUE,
    NOTIFICATIONS_QUEUE, SYNC_QUEUE, WEBHOOK_QUEUE,
};
