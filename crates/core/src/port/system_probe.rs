// Process resource monitoring port
// reason: async-trait so adapters may refresh OS counters off the hot path
use async_trait::async_trait;
use serde::Serialize;

/// Resource usage of the worker process itself
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMetrics {
    pub pid: u32,
    pub memory_rss_bytes: u64,
    pub virtual_memory_bytes: u64,
    pub cpu_usage_percent: f32,
}

/// System probe port for process introspection
///
/// Read by the `/status` endpoint; never touches the queue backend.
#[async_trait]
pub trait SystemProbe: Send + Sync {
    /// Get current process metrics
    async fn process_metrics(&self) -> ProcessMetrics;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;

    /// Mock SystemProbe returning fixed numbers
    pub struct MockSystemProbe {
        metrics: ProcessMetrics,
    }

    impl MockSystemProbe {
        pub fn new(memory_rss_bytes: u64, cpu_usage_percent: f32) -> Self {
            Self {
                metrics: ProcessMetrics {
                    pid: std::process::id(),
                    memory_rss_bytes,
                    virtual_memory_bytes: memory_rss_bytes * 4,
                    cpu_usage_percent,
                },
            }
        }
    }

    impl Default for MockSystemProbe {
        fn default() -> Self {
            Self::new(64 * 1024 * 1024, 1.5)
        }
    }

    #[async_trait]
    impl SystemProbe for MockSystemProbe {
        async fn process_metrics(&self) -> ProcessMetrics {
            self.metrics.clone()
        }
    }
}
