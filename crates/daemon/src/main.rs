//! Income Clarity Worker - Main Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Instrument};

use clarity_core::application::worker::{spawn_supervised, worker_span};
use clarity_core::application::{ShutdownReason, ShutdownReport, ShutdownTrigger, WorkerConfig};
use clarity_core::port::id_provider::UuidProvider;
use clarity_core::port::time_provider::SystemTimeProvider;
use clarity_core::port::QueueBackend;
use clarity_infra_redis::{connect, RedisQueueBackend};
use clarity_infra_system::SystemProbeImpl;
use clarity_worker::app::{start_worker, WorkerDeps};
use clarity_worker::config::WorkerArgs;
use clarity_worker::{logging, processors};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() {
    let args = WorkerArgs::parse();

    if let Err(e) = logging::init(args.log_format) {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }

    let config = match args.to_worker_config().context("Invalid configuration") {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Worker failed to start");
            std::process::exit(1);
        }
    };

    let worker_name = config.worker_name.clone();
    let code = match run(args, config).instrument(worker_span(&worker_name)).await {
        Ok(report) => report.exit_code(),
        Err(e) => {
            error!(worker = %worker_name, error = %format!("{:#}", e), "Worker failed to start");
            1
        }
    };
    std::process::exit(code);
}

async fn run(args: WorkerArgs, config: WorkerConfig) -> Result<ShutdownReport> {
    info!(
        worker = %config.worker_name,
        version = VERSION,
        backend = ?config.backend,
        "Income Clarity worker starting"
    );

    let registry = processors::build_registry(
        &args.processor_command,
        args.processor_workdir.as_deref(),
    )?;
    // Fail on unknown queues before touching the network
    registry.resolve(&config.queues)?;

    let time_provider = Arc::new(SystemTimeProvider);
    let conn = connect(&config.backend)
        .await
        .context("Failed to connect to Redis")?;
    let backend = Arc::new(RedisQueueBackend::new(
        conn,
        Arc::new(UuidProvider),
        time_provider.clone(),
    ));
    backend.ping().await.context("Redis ping failed")?;

    let worker_name = config.worker_name.clone();
    let worker = start_worker(
        config,
        WorkerDeps {
            backend,
            registry,
            probe: Arc::new(SystemProbeImpl::new()),
            time_provider,
        },
    )
    .await
    .context("Worker startup failed")?;

    logging::escalate_panics(worker.trigger());
    let signals = forward_signals(worker.trigger()).instrument(worker_span(&worker_name));
    spawn_supervised("signals", signals, worker.trigger());

    let report = worker.wait().await;
    info!(
        worker = %worker_name,
        reason = %report.reason,
        exit_code = report.exit_code(),
        "Worker exiting"
    );
    Ok(report)
}

/// Fire the shutdown trigger on every SIGTERM / SIGINT; repeats are no-ops
async fn forward_signals(trigger: ShutdownTrigger) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal as unix_signal, SignalKind};

        let mut terminate = match unix_signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                trigger.fire(ShutdownReason::Fatal(format!("SIGTERM handler: {}", e)));
                return;
            }
        };
        loop {
            let name = tokio::select! {
                res = signal::ctrl_c() => match res {
                    Ok(()) => "SIGINT",
                    Err(e) => {
                        trigger.fire(ShutdownReason::Fatal(format!("SIGINT handler: {}", e)));
                        return;
                    }
                },
                _ = terminate.recv() => "SIGTERM",
            };
            info!(worker = %trigger.worker_name(), signal = name, "Signal received");
            trigger.fire(ShutdownReason::Signal(name));
        }
    }

    #[cfg(not(unix))]
    {
        loop {
            if let Err(e) = signal::ctrl_c().await {
                trigger.fire(ShutdownReason::Fatal(format!("Ctrl+C handler: {}", e)));
                return;
            }
            info!(worker = %trigger.worker_name(), "Ctrl+C received");
            trigger.fire(ShutdownReason::Signal("SIGINT"));
        }
    }
}
