//! Income Clarity worker daemon
//!
//! Library half of the `income-clarity-worker` binary, shared with the
//! end-to-end tests.

pub mod app;
pub mod config;
pub mod logging;
pub mod processors;

pub use app::{start_worker, RunningWorker, WorkerDeps};
