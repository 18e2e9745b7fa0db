//! Accept loop and per-connection serving.
//!
//! # Responsibilities
//! - Bind the listener and report the outcome to the `RunHandle`
//! - Flip the lifecycle to `Serving` only once the listener is bound
//! - Hand each accepted stream to hyper with the injected router
//! - On stop: drop the listener, ask every connection to finish gracefully
//!
//! Connection tasks live in a `JoinSet` owned by the serve task, so aborting
//! the serve task aborts every in-flight connection with it.

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::lifecycle::{LifecycleState, ShutdownSignal};
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};

/// Back-off after a failed `accept`, e.g. when the process is out of file descriptors.
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(50);

/// Everything the serve task needs from its owning server.
pub(crate) struct ServeContext {
    pub config: ServerConfig,
    pub router: Router,
    pub state: Arc<LifecycleState>,
    pub tracker: ConnectionTracker,
    pub local_addr: Arc<OnceLock<SocketAddr>>,
}

/// Marks the server as exited if the serve task ends while still live,
/// including by panic.
struct ExitGuard(Arc<LifecycleState>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if self.0.mark_exited() {
            tracing::warn!("HTTP server exited without a close request");
        }
    }
}

pub(crate) async fn serve(
    ctx: ServeContext,
    mut stop: ShutdownSignal,
    ready: oneshot::Sender<Result<SocketAddr, ServerError>>,
) {
    let address = ctx.config.address.clone();

    let bound = match Listener::bind(&ctx.config).await {
        Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
        Err(ListenerError::Bind(e)) | Err(ListenerError::Accept(e)) => Err(e),
        Err(e @ ListenerError::Closed) => Err(std::io::Error::other(e.to_string())),
    };

    let (listener, local_addr) = match bound {
        Ok(bound) => bound,
        Err(source) => {
            tracing::error!(address = %address, error = %source, "Failed to bind HTTP server");
            ctx.state.mark_bind_failed();
            let _ = ready.send(Err(ServerError::Bind { address, source }));
            return;
        }
    };

    let _ = ctx.local_addr.set(local_addr);

    if !ctx.state.mark_serving() {
        tracing::debug!(address = %local_addr, "Stop requested before the listener started");
        let _ = ready.send(Err(ServerError::Stopped));
        return;
    }
    let _exit = ExitGuard(Arc::clone(&ctx.state));

    tracing::info!(
        address = %local_addr,
        max_connections = listener.max_connections(),
        "HTTP server listening"
    );
    let _ = ready.send(Ok(local_addr));

    let conn_signal = stop.clone();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            _ = stop.recv() => break,

            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                log_connection_exit(joined);
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer, permit)) => {
                    let guard = ctx.tracker.track();
                    let conn = serve_connection(stream, peer, permit, guard, ctx.router.clone(), conn_signal.clone());
                    connections.spawn(conn.with_current_subscriber());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                }
            },
        }
    }

    drop(listener);
    tracing::info!(
        address = %local_addr,
        active_connections = ctx.tracker.active_count(),
        "HTTP server stopped accepting, draining connections"
    );

    while let Some(joined) = connections.join_next().await {
        log_connection_exit(joined);
    }

    tracing::info!(address = %local_addr, "HTTP server stopped");
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    _permit: ConnectionPermit,
    guard: ConnectionGuard,
    router: Router,
    mut stop: ShutdownSignal,
) {
    let connection_id = guard.id();
    tracing::trace!(connection_id = %connection_id, peer_addr = %peer, "Serving connection");

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(stream), TowerToHyperService::new(router));
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = stop.recv() => {
            tracing::trace!(connection_id = %connection_id, "Draining connection");
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    if let Err(e) = result {
        tracing::debug!(
            connection_id = %connection_id,
            peer_addr = %peer,
            error = %e,
            "Connection ended with error"
        );
    }
}

fn log_connection_exit(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Connection task panicked");
        }
    }
}
