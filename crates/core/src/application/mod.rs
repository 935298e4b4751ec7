// Application Layer - Worker lifecycle use cases

pub mod config;
pub mod coordinator;
pub mod enqueue;
pub mod events;
pub mod pool;
pub mod registry;
pub mod retry;
pub mod scheduler;
pub mod state;
pub mod worker;

// Re-exports
pub use config::{BackendConfig, WorkerConfig};
pub use coordinator::{
    ShutdownCoordinator, ShutdownOutcome, ShutdownReason, ShutdownReport, ShutdownTrigger,
};
pub use events::{EventAggregator, EventSender, WorkerEvent};
pub use pool::WorkerPool;
pub use enqueue::EnqueueRequest;
pub use registry::ProcessorRegistry;
pub use scheduler::QueueScheduler;
pub use state::{StatsSnapshot, WorkerRuntimeState};
pub use worker::{shutdown_channel, QueueConsumer, ServiceHandle, ShutdownSender, ShutdownToken};
