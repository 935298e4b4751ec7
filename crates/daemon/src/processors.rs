//! Queue → processor wiring

use std::path::Path;
use std::sync::Arc;

use clarity_core::application::ProcessorRegistry;
use clarity_core::domain::{
    CLEANUP_QUEUE, EMAIL_QUEUE, NOTIFICATIONS_QUEUE, SYNC_QUEUE, WEBHOOK_QUEUE,
};
use clarity_core::error::{AppError, Result};
use clarity_core::port::JobProcessor;
use clarity_infra_system::CommandProcessor;

pub const SYNC_PROCESSOR: &str = "sync";
pub const NOTIFICATION_PROCESSOR: &str = "notification";
pub const CLEANUP_PROCESSOR: &str = "cleanup";

fn command(kind: &str, command_line: &str, workdir: Option<&Path>) -> Result<Arc<dyn JobProcessor>> {
    let processor = CommandProcessor::for_kind(kind, command_line)
        .map_err(|e| AppError::Config(format!("processor {}: {}", kind, e)))?;
    let processor = match workdir {
        Some(dir) => processor.with_working_dir(dir),
        None => processor,
    };
    Ok(Arc::new(processor))
}

/// sync and webhook share the sync handler, email and notifications share
/// the notification handler, cleanup has its own
pub fn build_registry(command_line: &str, workdir: Option<&Path>) -> Result<ProcessorRegistry> {
    let sync = command(SYNC_PROCESSOR, command_line, workdir)?;
    let notification = command(NOTIFICATION_PROCESSOR, command_line, workdir)?;
    let cleanup = command(CLEANUP_PROCESSOR, command_line, workdir)?;

    Ok(ProcessorRegistry::new()
        .register(SYNC_QUEUE, Arc::clone(&sync))
        .register(WEBHOOK_QUEUE, sync)
        .register(EMAIL_QUEUE, Arc::clone(&notification))
        .register(NOTIFICATIONS_QUEUE, notification)
        .register(CLEANUP_QUEUE, cleanup))
}
