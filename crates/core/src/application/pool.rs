// Worker Pool - one consumer and one scheduler per configured queue

use futures::future::join_all;
use std::sync::Arc;
use tracing::info;

use crate::application::config::WorkerConfig;
use crate::application::coordinator::ShutdownTrigger;
use crate::application::events::EventSender;
use crate::application::registry::ProcessorRegistry;
use crate::application::scheduler::QueueScheduler;
use crate::application::state::WorkerRuntimeState;
use crate::application::worker::{QueueConsumer, ServiceHandle};
use crate::error::Result;
use crate::port::QueueBackend;

pub struct WorkerPool {
    worker_name: String,
    state: Arc<WorkerRuntimeState>,
    consumers: Vec<ServiceHandle>,
    schedulers: Vec<ServiceHandle>,
}

impl WorkerPool {
    /// Resolve processors, then create consumers and schedulers
    ///
    /// Processor resolution happens before anything is spawned: an unknown
    /// queue returns `AppError::Config` and leaves no task behind. `events`
    /// is consumed so that the aggregator ends once every service closed.
    pub fn start(
        config: &WorkerConfig,
        backend: Arc<dyn QueueBackend>,
        registry: &ProcessorRegistry,
        state: Arc<WorkerRuntimeState>,
        events: EventSender,
        trigger: ShutdownTrigger,
    ) -> Result<Self> {
        let bindings = registry.resolve(&config.queues)?;

        let mut consumers = Vec::with_capacity(bindings.len());
        let mut schedulers = Vec::with_capacity(bindings.len());
        for (queue, processor) in bindings {
            state.register_queue(&queue);
            consumers.push(
                QueueConsumer::new(
                    queue.clone(),
                    &config.worker_name,
                    Arc::clone(&backend),
                    processor,
                    config.concurrency,
                    events.clone(),
                )
                .spawn(trigger.clone()),
            );
            schedulers.push(
                QueueScheduler::new(queue, &config.worker_name, Arc::clone(&backend), events.clone())
                    .spawn(trigger.clone()),
            );
        }

        info!(
            worker = %config.worker_name,
            queues = ?config.queues,
            concurrency = config.concurrency,
            "Worker pool started"
        );

        Ok(Self {
            worker_name: config.worker_name.clone(),
            state,
            consumers,
            schedulers,
        })
    }

    /// Stop intake on every queue and wait for in-flight jobs, concurrently
    pub async fn close_consumers(&mut self) {
        self.state.mark_all_closing();
        let consumers = std::mem::take(&mut self.consumers);
        info!(worker = %self.worker_name, count = consumers.len(), "Closing consumers");
        join_all(consumers.into_iter().map(ServiceHandle::close)).await;
    }

    pub async fn close_schedulers(&mut self) {
        let schedulers = std::mem::take(&mut self.schedulers);
        info!(worker = %self.worker_name, count = schedulers.len(), "Closing schedulers");
        join_all(schedulers.into_iter().map(ServiceHandle::close)).await;
    }

    /// Consumers first, then schedulers
    pub async fn close(mut self) {
        self.close_consumers().await;
        self.close_schedulers().await;
    }
}
