//! Composition root
//!
//! Startup order: runtime state, coordinator, event aggregator, worker pool,
//! HTTP server. The port is bound only once every consumer exists, so a
//! configuration error never exposes a health endpoint.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tracing::{info, Instrument};

use clarity_api_http::{ConfigSummary, HttpServer, IntrospectionState};
use clarity_core::application::worker::{spawn_supervised, worker_span, ServiceHandle};
use clarity_core::application::{
    EventAggregator, ProcessorRegistry, ShutdownCoordinator, ShutdownReport, ShutdownTrigger,
    WorkerConfig, WorkerPool, WorkerRuntimeState,
};
use clarity_core::error::Result;
use clarity_core::port::{QueueBackend, SystemProbe, TimeProvider};
use tokio::task::JoinHandle;

/// Adapters the worker runs against
pub struct WorkerDeps {
    pub backend: Arc<dyn QueueBackend>,
    pub registry: ProcessorRegistry,
    pub probe: Arc<dyn SystemProbe>,
    pub time_provider: Arc<dyn TimeProvider>,
}

/// A started worker, waiting for its shutdown trigger
pub struct RunningWorker {
    state: Arc<WorkerRuntimeState>,
    coordinator: ShutdownCoordinator,
    pool: WorkerPool,
    aggregator: JoinHandle<()>,
    http: ServiceHandle,
    http_addr: SocketAddr,
}

impl RunningWorker {
    pub fn trigger(&self) -> ShutdownTrigger {
        self.coordinator.trigger()
    }

    pub fn state(&self) -> Arc<WorkerRuntimeState> {
        Arc::clone(&self.state)
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Block until a trigger fires, then drain
    pub async fn wait(self) -> ShutdownReport {
        self.coordinator
            .run(Some(self.http), self.pool, self.aggregator)
            .await
    }
}

pub async fn start_worker(config: WorkerConfig, deps: WorkerDeps) -> Result<RunningWorker> {
    let state = Arc::new(WorkerRuntimeState::new(
        config.worker_name.clone(),
        deps.time_provider,
    ));
    let coordinator = ShutdownCoordinator::new(Arc::clone(&state), config.shutdown_timeout);
    let trigger = coordinator.trigger();

    let (events, aggregator) = EventAggregator::channel(Arc::clone(&state));
    let aggregator = spawn_supervised(
        "events",
        aggregator.run().instrument(worker_span(&config.worker_name)),
        trigger.clone(),
    );

    let pool = WorkerPool::start(
        &config,
        deps.backend,
        &deps.registry,
        Arc::clone(&state),
        events,
        trigger.clone(),
    )?;

    let introspection = IntrospectionState::new(
        Arc::clone(&state),
        deps.probe,
        ConfigSummary::from(&config),
    );
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.health_port));
    let (http, http_addr) = match HttpServer::new(addr, introspection).start(trigger).await {
        Ok(started) => started,
        Err(e) => {
            pool.close().await;
            return Err(e);
        }
    };

    info!(
        worker = %config.worker_name,
        queues = ?config.queues,
        concurrency = config.concurrency,
        health_port = http_addr.port(),
        "Worker ready"
    );

    Ok(RunningWorker {
        state,
        coordinator,
        pool,
        aggregator,
        http,
        http_addr,
    })
}
