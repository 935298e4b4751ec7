// Processor registry: queue name -> processor, built once at startup

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::port::JobProcessor;

/// Static registration map
///
/// Resolution happens eagerly for the whole queue list, so an unknown queue
/// stops the process before any consumer exists.
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn JobProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the processor bound to `queue`
    pub fn register(mut self, queue: impl Into<String>, processor: Arc<dyn JobProcessor>) -> Self {
        self.processors.insert(queue.into(), processor);
        self
    }

    pub fn get(&self, queue: &str) -> Option<Arc<dyn JobProcessor>> {
        self.processors.get(queue).cloned()
    }

    /// Registered queue names, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.processors.keys().cloned().collect();
        names.sort();
        names
    }

    /// Bind every configured queue to its processor, in configuration order
    pub fn resolve(&self, queues: &[String]) -> Result<Vec<(String, Arc<dyn JobProcessor>)>> {
        let unknown: Vec<&str> = queues
            .iter()
            .filter(|q| !self.processors.contains_key(q.as_str()))
            .map(|q| q.as_str())
            .collect();

        if !unknown.is_empty() {
            return Err(AppError::Config(format!(
                "no processor registered for queue(s): {} (known: {})",
                unknown.join(", "),
                self.queue_names().join(", ")
            )));
        }

        Ok(queues
            .iter()
            .filter_map(|q| self.get(q).map(|p| (q.clone(), p)))
            .collect())
    }
}
