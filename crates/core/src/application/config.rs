// Worker configuration, validated once at startup

use serde::Serialize;
use std::time::Duration;

use crate::application::worker::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_HEALTH_PORT, DEFAULT_SHUTDOWN_TIMEOUT,
};
use crate::domain::DEFAULT_QUEUES;
use crate::error::{AppError, Result};

pub const DEFAULT_REDIS_HOST: &str = "localhost";
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Queue backend connection descriptor
///
/// The password is never serialized and never printed.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    pub password: Option<String>,
    pub db: i64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_REDIS_HOST.to_string(),
            port: DEFAULT_REDIS_PORT,
            password: None,
            db: 0,
        }
    }
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("db", &self.db)
            .finish()
    }
}

/// Process-wide worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_name: String,
    pub queues: Vec<String>,
    /// Applies uniformly to every queue
    pub concurrency: usize,
    pub health_port: u16,
    pub shutdown_timeout: Duration,
    pub backend: BackendConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_name: default_worker_name(std::process::id(), chrono::Utc::now().timestamp_millis()),
            queues: DEFAULT_QUEUES.iter().map(|q| q.to_string()).collect(),
            concurrency: DEFAULT_CONCURRENCY,
            health_port: DEFAULT_HEALTH_PORT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            backend: BackendConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Normalize and check the configuration
    ///
    /// Queue names are trimmed, empty entries dropped and duplicates removed
    /// (first occurrence wins). Whether each queue has a processor is checked
    /// separately by the registry.
    pub fn validate(mut self) -> Result<Self> {
        if self.worker_name.trim().is_empty() {
            return Err(AppError::Config("worker name cannot be empty".to_string()));
        }
        if self.concurrency == 0 {
            return Err(AppError::Config("concurrency must be at least 1".to_string()));
        }

        let mut queues: Vec<String> = Vec::with_capacity(self.queues.len());
        for queue in self.queues.iter().map(|q| q.trim()).filter(|q| !q.is_empty()) {
            if !queues.iter().any(|q| q == queue) {
                queues.push(queue.to_string());
            }
        }
        if queues.is_empty() {
            return Err(AppError::Config("at least one queue must be configured".to_string()));
        }
        self.queues = queues;

        if self.backend.host.trim().is_empty() {
            return Err(AppError::Config("backend host cannot be empty".to_string()));
        }

        Ok(self)
    }
}

/// `worker-<pid>-<unix millis>`
pub fn default_worker_name(pid: u32, now_millis: i64) -> String {
    format!("worker-{}-{}", pid, now_millis)
}
