// Port Layer - Interfaces for external dependencies

pub mod id_provider; // For deterministic testing
pub mod job_processor;
pub mod queue_backend;
pub mod system_probe;
pub mod time_provider;

// Re-exports
pub use id_provider::IdProvider;
pub use job_processor::{JobProcessor, ProcessorError};
pub use queue_backend::{FailureDisposition, QueueBackend, StallRecovery, StalledJob};
pub use system_probe::{ProcessMetrics, SystemProbe};
pub use time_provider::TimeProvider;
