//! Response bodies (camelCase JSON)

use clarity_core::application::WorkerConfig;
use clarity_core::port::ProcessMetrics;
use serde::Serialize;

pub const HEALTHY: &str = "healthy";
pub const UNHEALTHY: &str = "unhealthy";

/// GET /health
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub queues: Vec<String>,
    pub active: u64,
    pub processed: u64,
    pub failed: u64,
    /// RFC 3339, null before the first job
    pub last_activity: Option<String>,
    pub timestamp: String,
}

/// GET /status
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub worker: WorkerInfo,
    pub process: ProcessMetrics,
    pub queues: Vec<QueueInfo>,
    pub stats: StatsInfo,
    pub config: ConfigSummary,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerInfo {
    pub name: String,
    pub pid: u32,
    pub version: &'static str,
    pub started_at: String,
    pub uptime_seconds: u64,
    pub shutting_down: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueInfo {
    pub name: String,
    /// `active` or `closing`
    pub status: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsInfo {
    pub processed: u64,
    pub failed: u64,
    pub active: u64,
    /// Two-decimal percentage, `"N/A"` before any job finished
    pub success_rate: String,
    pub last_activity: Option<String>,
}

/// Active configuration as shown on /status; carries no credentials
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    pub concurrency: usize,
    pub queues: Vec<String>,
    pub health_port: u16,
    pub shutdown_timeout_ms: u64,
    pub backend: BackendSummary,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSummary {
    pub host: String,
    pub port: u16,
    pub db: i64,
}

impl From<&WorkerConfig> for ConfigSummary {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency,
            queues: config.queues.clone(),
            health_port: config.health_port,
            shutdown_timeout_ms: config.shutdown_timeout.as_millis() as u64,
            backend: BackendSummary {
                host: config.backend.host.clone(),
                port: config.backend.port,
                db: config.backend.db,
            },
        }
    }
}
