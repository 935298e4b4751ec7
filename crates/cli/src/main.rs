//! Clarity CLI - operator tool for the Income Clarity worker

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::sync::Arc;
use tabled::{Table, Tabled};

use clarity_core::application::config::{DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT};
use clarity_core::application::{enqueue, BackendConfig, EnqueueRequest};
use clarity_core::domain::DEFAULT_QUEUES;
use clarity_core::port::id_provider::UuidProvider;
use clarity_core::port::time_provider::SystemTimeProvider;
use clarity_core::port::QueueBackend;
use clarity_infra_redis::{connect, RedisQueueBackend};

const DEFAULT_WORKER_URL: &str = "http://127.0.0.1:3001";

#[derive(Parser)]
#[command(name = "clarity")]
#[command(about = "Income Clarity worker CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Worker health server URL
    #[arg(long, env = "CLARITY_WORKER_URL", default_value = DEFAULT_WORKER_URL)]
    worker_url: String,

    #[command(flatten)]
    redis: RedisArgs,
}

#[derive(Args)]
struct RedisArgs {
    #[arg(long, env = "REDIS_HOST", default_value = DEFAULT_REDIS_HOST, global = true)]
    redis_host: String,

    #[arg(long, env = "REDIS_PORT", default_value_t = DEFAULT_REDIS_PORT, global = true)]
    redis_port: u16,

    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true, global = true)]
    redis_password: Option<String>,

    #[arg(long, env = "REDIS_DB", default_value_t = 0, global = true)]
    redis_db: i64,
}

impl RedisArgs {
    fn backend_config(&self) -> BackendConfig {
        BackendConfig {
            host: self.redis_host.clone(),
            port: self.redis_port,
            password: self.redis_password.clone().filter(|p| !p.is_empty()),
            db: self.redis_db,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check worker liveness
    Health {
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show worker status, counters and configuration
    Status {
        #[arg(long)]
        json: bool,
    },

    /// Push a job into a queue
    Enqueue {
        #[arg(short, long)]
        queue: String,

        /// Job name
        #[arg(short, long)]
        name: String,

        /// Payload as JSON object
        #[arg(short, long, default_value = "{}")]
        payload: String,

        /// Maximum attempts including the first
        #[arg(long)]
        attempts: Option<u32>,

        /// Base retry backoff
        #[arg(long)]
        backoff_ms: Option<u64>,

        /// Run no earlier than this many milliseconds from now
        #[arg(long, default_value_t = 0)]
        delay_ms: u64,
    },

    /// Show backend job counts per queue
    Counts {
        /// Single queue (default: all known queues)
        #[arg(short, long)]
        queue: Option<String>,
    },
}

#[derive(Tabled)]
struct QueueRow {
    queue: String,
    status: String,
}

#[derive(Tabled)]
struct CountsRow {
    queue: String,
    waiting: u64,
    active: u64,
    delayed: u64,
    completed: u64,
    failed: u64,
}

#[derive(Tabled)]
struct EnqueueRow {
    job_id: String,
    queue: String,
    name: String,
}

/// GET a worker endpoint; 503 still carries a JSON body
async fn get_json(base: &str, path: &str) -> Result<(reqwest::StatusCode, Value)> {
    let url = format!("{}{}", base.trim_end_matches('/'), path);
    let response = reqwest::get(&url)
        .await
        .with_context(|| format!("Failed to reach worker at {}", url))?;
    let status = response.status();
    let body = response.json().await.context("Failed to parse response")?;
    Ok((status, body))
}

async fn backend(args: &RedisArgs) -> Result<RedisQueueBackend> {
    let conn = connect(&args.backend_config())
        .await
        .context("Failed to connect to Redis")?;
    Ok(RedisQueueBackend::new(
        conn,
        Arc::new(UuidProvider),
        Arc::new(SystemTimeProvider),
    ))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "-".to_string(),
        other => other.to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Health { json } => {
            let (status, body) = get_json(&cli.worker_url, "/health").await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                let label = if status.is_success() {
                    "HEALTHY".green().bold()
                } else {
                    "UNHEALTHY".red().bold()
                };
                println!("  {} {}", "Status:".bold(), label);
                println!("  {} {}s", "Uptime:".bold(), body["uptimeSeconds"]);
                println!("  {} {}", "Active:".bold(), body["active"]);
                println!("  {} {}", "Processed:".bold(), body["processed"]);
                println!("  {} {}", "Failed:".bold(), body["failed"]);
                println!("  {} {}", "Last activity:".bold(), text(&body["lastActivity"]));
            }
            if !status.is_success() {
                std::process::exit(1);
            }
        }

        Commands::Status { json } => {
            let (_, body) = get_json(&cli.worker_url, "/status").await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }

            let worker = &body["worker"];
            let stats = &body["stats"];
            println!("{}", format!("Worker {}", text(&worker["name"])).cyan().bold());
            println!();
            println!("  {} {}", "Version:".bold(), text(&worker["version"]));
            println!("  {} {}", "PID:".bold(), worker["pid"]);
            println!("  {} {}", "Started:".bold(), text(&worker["startedAt"]));
            println!("  {} {}s", "Uptime:".bold(), worker["uptimeSeconds"]);
            if worker["shuttingDown"].as_bool().unwrap_or(false) {
                println!("  {} {}", "State:".bold(), "SHUTTING DOWN".yellow());
            }
            println!();
            println!("  {} {}", "Processed:".bold(), stats["processed"]);
            println!("  {} {}", "Failed:".bold(), stats["failed"]);
            println!("  {} {}", "Active:".bold(), stats["active"]);
            println!("  {} {}", "Success rate:".bold(), text(&stats["successRate"]));
            let rss_mb =
                body["process"]["memoryRssBytes"].as_u64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
            println!("  {} {:.2} MB", "Memory:".bold(), rss_mb);
            println!();

            let rows: Vec<QueueRow> = body["queues"]
                .as_array()
                .map(|queues| {
                    queues
                        .iter()
                        .map(|q| QueueRow {
                            queue: text(&q["name"]),
                            status: text(&q["status"]),
                        })
                        .collect()
                })
                .unwrap_or_default();
            println!("{}", Table::new(rows));
        }

        Commands::Enqueue {
            queue,
            name,
            payload,
            attempts,
            backoff_ms,
            delay_ms,
        } => {
            let payload: Value = serde_json::from_str(&payload).context("Invalid JSON payload")?;
            if !enqueue::is_known_queue(&queue) {
                println!(
                    "{}",
                    format!("! Queue '{}' is not served by the default worker", queue).yellow()
                );
            }

            let backend = backend(&cli.redis).await?;
            let request = EnqueueRequest {
                queue: queue.clone(),
                name: name.clone(),
                payload,
                max_attempts: attempts,
                backoff_ms,
                delay_ms,
            };
            let job_id = enqueue::execute(&backend, request).await?;

            println!("{}", "✓ Job enqueued successfully".green().bold());
            println!();
            println!("{}", Table::new(vec![EnqueueRow { job_id, queue, name }]));
        }

        Commands::Counts { queue } => {
            let backend = backend(&cli.redis).await?;
            let queues: Vec<String> = match queue {
                Some(q) => vec![q],
                None => DEFAULT_QUEUES.iter().map(|q| q.to_string()).collect(),
            };

            let mut rows = Vec::with_capacity(queues.len());
            for queue in queues {
                let counts = backend
                    .counts(&queue)
                    .await
                    .with_context(|| format!("Failed to read counts for {}", queue))?;
                rows.push(CountsRow {
                    queue,
                    waiting: counts.waiting,
                    active: counts.active,
                    delayed: counts.delayed,
                    completed: counts.completed,
                    failed: counts.failed,
                });
            }
            println!("{}", Table::new(rows));
        }
    }

    Ok(())
}
