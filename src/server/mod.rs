//! HTTP Server
//!
//! Plain HTTP/1.1 front end for the compute engine.
//!
//! | Route | Method | Response |
//! |-------|--------|----------|
//! | `/calculate` | POST | JSON array of `{r, n, result}` |
//! | `/health` | GET | `OK` |
//! | `/metrics` | GET | Prometheus text format |
//!
//! Shutdown is cooperative: cancelling the token stops the accept loop and
//! asks every open connection to finish its in-flight request. Connection
//! tasks are registered with the caller's [`TaskTracker`] so the caller can
//! wait for them with its own deadline.

mod handlers;

pub use handlers::handle;

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::engine::ComputeEngine;
use crate::error::{Error, Result};

/// Bind `addr`, failing with a descriptive error
pub async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind {}: {}", addr, e)))
}

/// Accept connections on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<ComputeEngine>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("HTTP server listening on {}", addr);
    }

    loop {
        let (stream, peer) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("HTTP server stopped accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    // Per-connection failures (e.g. fd exhaustion) are not fatal.
                    error!("Accept error: {}", e);
                    continue;
                }
            },
        };

        let engine = engine.clone();
        let shutdown = shutdown.clone();
        tracker.spawn(async move {
            let service = service_fn(move |req| {
                let engine = engine.clone();
                async move {
                    Ok::<_, std::convert::Infallible>(handlers::handle(engine, req).await)
                }
            });

            let conn = http1::Builder::new().serve_connection(TokioIo::new(stream), service);
            tokio::pin!(conn);

            let result = tokio::select! {
                result = conn.as_mut() => result,
                _ = shutdown.cancelled() => {
                    conn.as_mut().graceful_shutdown();
                    conn.await
                }
            };

            if let Err(e) = result {
                debug!("Connection from {} ended with error: {}", peer, e);
            }
        });
    }
}
