//! Command-line and environment configuration
//!
//! Precedence: flag, then environment variable, then default.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use clarity_core::application::config::{
    default_worker_name, DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT,
};
use clarity_core::application::worker::constants::{DEFAULT_CONCURRENCY, DEFAULT_HEALTH_PORT};
use clarity_core::application::{BackendConfig, WorkerConfig};
use clarity_core::domain::DEFAULT_QUEUES;
use clarity_core::error::Result;
use clarity_infra_system::DEFAULT_PROCESSOR_COMMAND;

use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "income-clarity-worker", version, about = "Income Clarity background job worker")]
pub struct WorkerArgs {
    /// Restrict the worker to a single queue (overrides WORKER_QUEUES)
    #[arg(long)]
    pub queue: Option<String>,

    /// Comma-separated queue list
    #[arg(long, env = "WORKER_QUEUES", value_delimiter = ',')]
    pub queues: Vec<String>,

    /// Jobs run at once per queue
    #[arg(long, env = "WORKER_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    #[arg(long, env = "HEALTH_CHECK_PORT", default_value_t = DEFAULT_HEALTH_PORT)]
    pub health_port: u16,

    #[arg(long, env = "WORKER_SHUTDOWN_TIMEOUT_MS", default_value_t = 30_000)]
    pub shutdown_timeout_ms: u64,

    /// Defaults to worker-<pid>-<unix millis>
    #[arg(long, env = "WORKER_NAME")]
    pub worker_name: Option<String>,

    #[arg(long, env = "REDIS_HOST", default_value = DEFAULT_REDIS_HOST)]
    pub redis_host: String,

    #[arg(long, env = "REDIS_PORT", default_value_t = DEFAULT_REDIS_PORT)]
    pub redis_port: u16,

    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    #[arg(long, env = "REDIS_DB", default_value_t = 0)]
    pub redis_db: i64,

    /// Handler command; the processor kind is appended
    #[arg(long, env = "PROCESSOR_COMMAND", default_value = DEFAULT_PROCESSOR_COMMAND)]
    pub processor_command: String,

    #[arg(long, env = "PROCESSOR_WORKDIR")]
    pub processor_workdir: Option<PathBuf>,

    #[arg(long, env = "WORKER_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl WorkerArgs {
    fn selected_queues(&self) -> Vec<String> {
        if let Some(queue) = &self.queue {
            return vec![queue.clone()];
        }
        let listed: Vec<String> = self
            .queues
            .iter()
            .map(|q| q.trim())
            .filter(|q| !q.is_empty())
            .map(str::to_string)
            .collect();
        if listed.is_empty() {
            DEFAULT_QUEUES.iter().map(|q| q.to_string()).collect()
        } else {
            listed
        }
    }

    /// Build and validate the worker configuration
    pub fn to_worker_config(&self) -> Result<WorkerConfig> {
        let worker_name = match &self.worker_name {
            Some(name) => name.clone(),
            None => default_worker_name(
                std::process::id(),
                std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_millis() as i64)
                    .unwrap_or_default(),
            ),
        };

        WorkerConfig {
            worker_name,
            queues: self.selected_queues(),
            concurrency: self.concurrency,
            health_port: self.health_port,
            shutdown_timeout: Duration::from_millis(self.shutdown_timeout_ms),
            backend: BackendConfig {
                host: self.redis_host.clone(),
                port: self.redis_port,
                password: self.redis_password.clone().filter(|p| !p.is_empty()),
                db: self.redis_db,
            },
        }
        .validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clarity_core::AppError;

    fn parse(args: &[&str]) -> WorkerArgs {
        let mut argv = vec!["income-clarity-worker"];
        argv.extend_from_slice(args);
        WorkerArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_queue_flag_restricts_to_one_queue() {
        let config = parse(&["--queue", "email", "--queues", "sync,cleanup"])
            .to_worker_config()
            .unwrap();
        assert_eq!(config.queues, vec!["email"]);
    }

    #[test]
    fn test_queue_list_is_split_and_deduplicated() {
        let config = parse(&["--queues", "sync, email,,sync"])
            .to_worker_config()
            .unwrap();
        assert_eq!(config.queues, vec!["sync", "email"]);
    }

    #[test]
    fn test_flags_map_onto_config() {
        let config = parse(&[
            "--queues",
            "email",
            "--concurrency",
            "7",
            "--health-port",
            "4100",
            "--shutdown-timeout-ms",
            "1500",
            "--worker-name",
            "w1",
            "--redis-password",
            "s3cret",
        ])
        .to_worker_config()
        .unwrap();

        assert_eq!(config.concurrency, 7);
        assert_eq!(config.health_port, 4100);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(1500));
        assert_eq!(config.worker_name, "w1");
        assert_eq!(config.backend.password.as_deref(), Some("s3cret"));
        assert!(!format!("{:?}", config.backend).contains("s3cret"));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let err = parse(&["--queues", "email", "--concurrency", "0"])
            .to_worker_config()
            .unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_non_numeric_port_is_a_parse_error() {
        assert!(WorkerArgs::try_parse_from(["income-clarity-worker", "--health-port", "abc"]).is_err());
    }
}
