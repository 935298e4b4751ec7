// Shutdown plumbing shared by consumers, schedulers and the HTTP server

use std::future::Future;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::panic_guard::{catch_guarded, panic_message};
use crate::application::coordinator::{ShutdownReason, ShutdownTrigger};

/// Shutdown signal for graceful termination
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal (returns at once if already signalled)
    pub async fn wait(&mut self) {
        let _ = self.rx.wait_for(|stop| *stop).await;
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to every token
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

/// A running background service that can be asked to stop and awaited
pub struct ServiceHandle {
    name: String,
    worker: String,
    stop: ShutdownSender,
    join: JoinHandle<()>,
}

impl ServiceHandle {
    pub fn new(
        name: impl Into<String>,
        worker: impl Into<String>,
        stop: ShutdownSender,
        join: JoinHandle<()>,
    ) -> Self {
        Self {
            name: name.into(),
            worker: worker.into(),
            stop,
            join,
        }
    }

    /// Signal stop and wait until the service has fully wound down
    pub async fn close(self) {
        self.stop.shutdown();
        if let Err(e) = self.join.await {
            error!(worker = %self.worker, service = %self.name, error = %e, "Service task ended abnormally");
        }
        debug!(worker = %self.worker, service = %self.name, "Service closed");
    }
}

/// Spawn an infrastructure task whose panic triggers process shutdown
pub fn spawn_supervised<F>(name: impl Into<String>, future: F, trigger: ShutdownTrigger) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    tokio::spawn(async move {
        if let Err(panic) = catch_guarded(future).await {
            let message = panic_message(panic.as_ref());
            error!(worker = %trigger.worker_name(), task = %name, panic_msg = %message, "Task panicked");
            trigger.fire(ShutdownReason::Panic { task: name, message });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_token_sees_signal_sent_before_wait() {
        let (sender, mut token) = shutdown_channel();
        assert!(!token.is_shutdown());
        sender.shutdown();
        // Must not hang
        token.wait().await;
        assert!(token.is_shutdown());
    }

    #[tokio::test]
    async fn test_service_handle_close_waits_for_task() {
        let (stop, mut token) = shutdown_channel();
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let join = tokio::spawn(async move {
            token.wait().await;
            let _ = done_tx.send(());
        });
        ServiceHandle::new("svc", "w", stop, join).close().await;
        assert!(done_rx.await.is_ok());
    }
}
