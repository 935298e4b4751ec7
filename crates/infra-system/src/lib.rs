// Income Clarity Infrastructure - System Adapters
// Implements: SystemProbe, JobProcessor (child process bridge)

pub mod command_processor;
pub mod system_probe_impl;

pub use command_processor::{CommandProcessor, DEFAULT_ENV_ALLOWLIST, DEFAULT_PROCESSOR_COMMAND};
pub use system_probe_impl::SystemProbeImpl;
