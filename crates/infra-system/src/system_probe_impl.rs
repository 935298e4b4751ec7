// System probe implementation
// reason: sysinfo for cross-platform process monitoring
use async_trait::async_trait;
use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, System};
use tracing::debug;

use clarity_core::port::system_probe::{ProcessMetrics, SystemProbe};

/// Reads resource usage of the current process
///
/// CPU usage is computed between two refreshes, so the first reading is 0.
pub struct SystemProbeImpl {
    system: Mutex<System>,
    pid: Option<Pid>,
}

impl SystemProbeImpl {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemProbeImpl {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SystemProbe for SystemProbeImpl {
    async fn process_metrics(&self) -> ProcessMetrics {
        let mut metrics = ProcessMetrics {
            pid: std::process::id(),
            ..Default::default()
        };
        let Some(pid) = self.pid else {
            return metrics;
        };

        let mut sys = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        sys.refresh_process(pid);
        if let Some(process) = sys.process(pid) {
            metrics.memory_rss_bytes = process.memory();
            metrics.virtual_memory_bytes = process.virtual_memory();
            metrics.cpu_usage_percent = process.cpu_usage();
        }

        debug!(
            pid = metrics.pid,
            rss_bytes = metrics.memory_rss_bytes,
            cpu = %metrics.cpu_usage_percent,
            "Process metrics collected"
        );
        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_process_metrics() {
        let probe = SystemProbeImpl::new();
        let metrics = probe.process_metrics().await;

        assert_eq!(metrics.pid, std::process::id());
        assert!(metrics.memory_rss_bytes > 0);
        assert!(metrics.cpu_usage_percent >= 0.0);
    }
}
