//! HTTP Handlers
//!
//! All handlers read `WorkerRuntimeState`; none of them mutate it.

use crate::error::ApiError;
use crate::types::{
    ConfigSummary, HealthResponse, QueueInfo, StatsInfo, StatusResponse, WorkerInfo, HEALTHY,
    UNHEALTHY,
};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{SecondsFormat, TimeZone, Utc};
use clarity_core::application::worker::worker_span;
use clarity_core::application::{StatsSnapshot, WorkerRuntimeState};
use clarity_core::port::SystemProbe;
use std::fmt::Write;
use std::sync::Arc;
use tracing::Instrument;

/// Prometheus text exposition format
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared state of the introspection routes
#[derive(Clone)]
pub struct IntrospectionState {
    runtime: Arc<WorkerRuntimeState>,
    probe: Arc<dyn SystemProbe>,
    config: Arc<ConfigSummary>,
}

impl IntrospectionState {
    pub fn new(
        runtime: Arc<WorkerRuntimeState>,
        probe: Arc<dyn SystemProbe>,
        config: ConfigSummary,
    ) -> Self {
        Self {
            runtime,
            probe,
            config: Arc::new(config),
        }
    }
}

pub fn router(state: IntrospectionState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .fallback(not_found)
        .with_state(state)
}

fn rfc3339(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}

/// GET /health: 200 while running with consumers, 503 otherwise
async fn health(State(state): State<IntrospectionState>) -> impl IntoResponse {
    let runtime = &state.runtime;
    let stats = runtime.snapshot();
    let healthy = !stats.shutting_down && runtime.has_consumers();

    let body = HealthResponse {
        status: if healthy { HEALTHY } else { UNHEALTHY },
        uptime_seconds: stats.uptime_secs,
        queues: runtime.queue_names(),
        active: stats.active,
        processed: stats.processed,
        failed: stats.failed,
        last_activity: stats.last_activity.map(rfc3339),
        timestamp: rfc3339(runtime.now_millis()),
    };
    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(body))
}

/// GET /metrics
async fn metrics(State(state): State<IntrospectionState>) -> impl IntoResponse {
    let body = render_metrics(state.runtime.worker_name(), &state.runtime.snapshot());
    ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body)
}

/// GET /status
async fn status(State(state): State<IntrospectionState>) -> Json<StatusResponse> {
    let runtime = &state.runtime;
    let stats = runtime.snapshot();
    let process = state
        .probe
        .process_metrics()
        .instrument(worker_span(runtime.worker_name()))
        .await;

    Json(StatusResponse {
        worker: WorkerInfo {
            name: runtime.worker_name().to_string(),
            pid: process.pid,
            version: clarity_core::VERSION,
            started_at: rfc3339(stats.started_at),
            uptime_seconds: stats.uptime_secs,
            shutting_down: stats.shutting_down,
        },
        process,
        queues: runtime
            .queue_statuses()
            .into_iter()
            .map(|(name, status)| QueueInfo {
                name,
                status: status.to_string(),
            })
            .collect(),
        stats: StatsInfo {
            processed: stats.processed,
            failed: stats.failed,
            active: stats.active,
            success_rate: stats.success_rate(),
            last_activity: stats.last_activity.map(rfc3339),
        },
        config: (*state.config).clone(),
        timestamp: rfc3339(runtime.now_millis()),
    })
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Label values escape backslash, double quote and newline
fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render the four worker series, each labeled with the worker name
pub fn render_metrics(worker_name: &str, stats: &StatsSnapshot) -> String {
    let label = escape_label(worker_name);
    let series: [(&str, &str, &str, u64); 4] = [
        ("worker_uptime_seconds", "gauge", "Seconds since the worker started", stats.uptime_secs),
        ("worker_jobs_processed_total", "counter", "Jobs completed successfully", stats.processed),
        ("worker_jobs_failed_total", "counter", "Jobs that failed", stats.failed),
        ("worker_jobs_active", "gauge", "Jobs currently running", stats.active),
    ];

    let mut out = String::new();
    for (name, kind, help, value) in series {
        let _ = writeln!(out, "# HELP {} {}", name, help);
        let _ = writeln!(out, "# TYPE {} {}", name, kind);
        let _ = writeln!(out, "{}{{worker=\"{}\"}} {}", name, label, value);
    }
    out
}
