//! HTTP server implementation.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::error::{Result, TurnstileError};

/// HTTP server fronted by the admission layer.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Fully layered application router
    app: Router,
    /// How long in-flight requests may drain after shutdown is signalled
    grace: Duration,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, app: Router, grace: Duration) -> Self {
        Self { addr, app, grace }
    }

    /// Bind and serve until `signal` resolves, then drain for at most the
    /// grace period before dropping remaining connections.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind(self.addr).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "HTTP server listening");

        let stop = Arc::new(Notify::new());
        let graceful = {
            let stop = stop.clone();
            async move { stop.notified().await }
        };

        let app = self
            .app
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(graceful)
                .await
        });

        tokio::select! {
            joined = &mut server => return flatten(joined),
            _ = signal => {}
        }

        info!(grace_ms = self.grace.as_millis() as u64, "Draining in-flight requests");
        stop.notify_one();

        match tokio::time::timeout(self.grace, &mut server).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                warn!("Grace period elapsed, dropping remaining connections");
                server.abort();
                Ok(())
            }
        }
    }
}

fn flatten(
    joined: std::result::Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            error!(error = %e, "HTTP server failed");
            Err(TurnstileError::Io(e))
        }
        Err(e) => {
            error!(error = %e, "HTTP server task failed");
            Err(TurnstileError::Io(std::io::Error::other(e)))
        }
    }
}
