//! Log output setup
//!
//! JSON lines in production, pretty output for local runs. Error records go
//! to stderr, everything else to stdout. `RUST_LOG` overrides the filter.
//! Lines logged inside a worker task carry the `worker` span.

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::sync::OnceLock;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clarity_core::application::worker::{is_guarded, panic_message};
use clarity_core::application::{ShutdownReason, ShutdownTrigger};

/// Trigger fired by panics nothing else catches
static PANIC_TRIGGER: OnceLock<ShutdownTrigger> = OnceLock::new();

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}

pub fn init(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;
    let writer = std::io::stderr
        .with_max_level(Level::ERROR)
        .or_else(std::io::stdout);

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_writer(writer),
            )
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_writer(writer))
            .try_init(),
    }
    .context("Failed to install log subscriber")?;

    install_panic_hook();
    Ok(())
}

/// Shut the worker down on panics outside job execution and supervised tasks
///
/// Only the first trigger registered in the process is kept.
pub fn escalate_panics(trigger: ShutdownTrigger) {
    let _ = PANIC_TRIGGER.set(trigger);
}

/// Route panics through the log pipeline instead of raw stderr
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        let message = panic_message(info.payload());
        tracing::error!(
            error = %message,
            location = %location,
            "Panic"
        );

        // Caught panics are handled where they are caught
        if is_guarded() {
            return;
        }
        if let Some(trigger) = PANIC_TRIGGER.get() {
            trigger.fire(ShutdownReason::Panic {
                task: format!("unsupervised task at {}", location),
                message,
            });
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use clarity_core::application::worker::{guard, PanicGuardResult};
    use clarity_core::application::{ShutdownCoordinator, WorkerRuntimeState};
    use clarity_core::port::time_provider::SystemTimeProvider;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_stray_panic_fires_shutdown_but_job_panic_does_not() {
        let state = Arc::new(WorkerRuntimeState::new("hook-test", Arc::new(SystemTimeProvider)));
        let mut coordinator = ShutdownCoordinator::new(state, Duration::from_secs(1));
        let trigger = coordinator.trigger();
        install_panic_hook();
        escalate_panics(trigger.clone());

        let caught: PanicGuardResult<()> = guard(async { panic!("job blew up") }).await;
        assert!(matches!(caught, PanicGuardResult::Panicked(_)));
        assert!(!trigger.is_fired());

        let stray = tokio::spawn(async { panic!("signal loop blew up") }).await;
        assert!(stray.is_err());
        assert!(trigger.is_fired());
        match coordinator.wait_for_trigger().await {
            ShutdownReason::Panic { task, message } => {
                assert!(task.starts_with("unsupervised task at "), "{}", task);
                assert_eq!(message, "signal loop blew up");
            }
            other => panic!("expected panic reason, got {:?}", other),
        }
    }

    #[test]
    fn test_log_format_values() {
        assert_eq!(LogFormat::from_str("json", true).unwrap(), LogFormat::Json);
        assert_eq!(LogFormat::from_str("PRETTY", true).unwrap(), LogFormat::Pretty);
        assert!(LogFormat::from_str("xml", true).is_err());
    }
}
