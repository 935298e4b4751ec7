//! HTTP Server
//!
//! Bound only after the pool created every consumer, closed first on shutdown.

use crate::handler::{router, IntrospectionState};
use clarity_core::application::worker::{spawn_supervised, worker_span};
use clarity_core::application::{shutdown_channel, ServiceHandle, ShutdownReason, ShutdownTrigger};
use clarity_core::error::Result;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info, Instrument};

pub struct HttpServer {
    addr: SocketAddr,
    state: IntrospectionState,
}

impl HttpServer {
    pub fn new(addr: SocketAddr, state: IntrospectionState) -> Self {
        Self { addr, state }
    }

    /// Bind and serve in the background
    ///
    /// Returns the handle used by the coordinator and the bound address
    /// (useful with port 0). A serve error fires `trigger`.
    pub async fn start(self, trigger: ShutdownTrigger) -> Result<(ServiceHandle, SocketAddr)> {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        let app = router(self.state);
        let (stop, mut token) = shutdown_channel();
        let worker = trigger.worker_name().to_string();

        info!(worker = %worker, addr = %local_addr, "Health server listening");

        let fatal = trigger.clone();
        let name = worker.clone();
        let serve = async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { token.wait().await })
                .await;
            match result {
                Ok(()) => info!(worker = %name, "Health server stopped"),
                Err(e) => {
                    error!(worker = %name, error = %e, "Health server failed");
                    fatal.fire(ShutdownReason::Fatal(format!("health server: {}", e)));
                }
            }
        };

        let join = spawn_supervised("http", serve.instrument(worker_span(&worker)), trigger);
        Ok((ServiceHandle::new("http", worker, stop, join), local_addr))
    }
}
