// Queue Domain Model

use serde::{Deserialize, Serialize};

/// Queue identifier
pub type QueueId = String;

pub const SYNC_QUEUE: &str = "sync";
pub const EMAIL_QUEUE: &str = "email";
pub const CLEANUP_QUEUE: &str = "cleanup";
pub const WEBHOOK_QUEUE: &str = "webhook";
pub const NOTIFICATIONS_QUEUE: &str = "notifications";

/// Queues a worker attaches to when none are configured
pub const DEFAULT_QUEUES: [&str; 5] = [
    SYNC_QUEUE,
    EMAIL_QUEUE,
    CLEANUP_QUEUE,
    WEBHOOK_QUEUE,
    NOTIFICATIONS_QUEUE,
];

/// Lifecycle of a queue's consumer inside this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Active,
    Closing,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueStatus::Active => write!(f, "active"),
            QueueStatus::Closing => write!(f, "closing"),
        }
    }
}

/// Job counts per list, as reported by the backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub waiting: u64,
    pub active: u64,
    pub delayed: u64,
    pub completed: u64,
    pub failed: u64,
}
