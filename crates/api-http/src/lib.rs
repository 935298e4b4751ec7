//! HTTP Introspection Layer
//!
//! Read-only endpoints over the worker's in-memory runtime state:
//! `/health` (liveness), `/metrics` (Prometheus text) and `/status` (JSON).
//! Handlers never call the queue backend.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::{router, IntrospectionState};
pub use server::HttpServer;
pub use types::ConfigSummary;
