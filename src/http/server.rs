//! HTTP server lifecycle.
//!
//! # Responsibilities
//! - Assemble a server from configuration and an injected router
//! - Start serving on a background task without blocking the caller
//! - Report liveness without locking
//! - Shut down gracefully, bounded by the configured timeout
//!
//! # Lifecycle
//! ```text
//! [unbuilt] --build ok--> [constructed]
//! [constructed] --run, bind ok--> [running]
//! [constructed] --run, bind fails--> [constructed]   (RunHandle gets ServerError::Bind)
//! [running] --close--> [stopped]                     (waits up to shutdown_timeout)
//! [stopped] --close--> [stopped]                     (no-op)
//! ```

use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use axum::extract::Request;
use axum::response::IntoResponse;
use axum::Router;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tower::Service;
use tracing::instrument::WithSubscriber;
use tracing::Dispatch;

use crate::config::{load_config, validate_config, ServerConfig, ValidationError};
use crate::error::ServerError;
use crate::http::serve::{self, ServeContext};
use crate::lifecycle::{LifecycleState, Phase, Shutdown};
use crate::net::ConnectionTracker;

/// A background HTTP server with an explicit start/stop lifecycle.
///
/// Built with [`HttpServer::builder`]. `run` spawns the serve task on the
/// current Tokio runtime, `running` reports liveness, and `close` performs a
/// graceful shutdown bounded by [`ServerConfig::shutdown_timeout`].
///
/// Dropping a running server aborts its serve task and every open connection.
pub struct HttpServer {
    config: ServerConfig,
    router: Router,
    dispatch: Option<Dispatch>,
    state: Arc<LifecycleState>,
    tracker: ConnectionTracker,
    local_addr: Arc<OnceLock<SocketAddr>>,
    slot: Mutex<Slot>,
}

/// What the server owns between `run` and the end of `close`.
enum Slot {
    Empty,
    Serving(Serving),
    /// A `close` is in progress; the receiver yields its outcome.
    Closing(watch::Receiver<Option<Result<(), ServerError>>>),
}

struct Serving {
    shutdown: Shutdown,
    task: JoinHandle<()>,
}

/// The part a `close` caller plays.
enum CloseClaim {
    Owner(Serving, watch::Sender<Option<Result<(), ServerError>>>),
    Waiter(watch::Receiver<Option<Result<(), ServerError>>>),
    Nothing,
}

impl HttpServer {
    /// Start building a server.
    pub fn builder() -> HttpServerBuilder {
        HttpServerBuilder::new()
    }

    /// Build a server from a configuration and a router.
    pub fn new(config: ServerConfig, router: Router) -> Result<Self, ServerError> {
        Self::builder().config(config).router(router).build()
    }

    /// Start accepting connections on a background task.
    ///
    /// Returns immediately. The server becomes live once the listener has
    /// bound; the returned [`RunHandle`] reports the bound address or the
    /// bind failure. A failed bind leaves the server constructed and `run`
    /// may be called again. Any other repeated call fails with
    /// [`ServerError::AlreadyRunning`].
    pub fn run(&self) -> Result<RunHandle, ServerError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ServerError::NoRuntime)?;

        let mut slot = self.lock_slot();
        self.state
            .begin_start()
            .map_err(|_| ServerError::AlreadyRunning)?;

        let shutdown = Shutdown::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let ctx = ServeContext {
            config: self.config.clone(),
            router: self.router.clone(),
            state: Arc::clone(&self.state),
            tracker: self.tracker.clone(),
            local_addr: Arc::clone(&self.local_addr),
        };

        let serve = serve::serve(ctx, shutdown.subscribe(), ready_tx);
        let task = match &self.dispatch {
            Some(dispatch) => runtime.spawn(serve.with_subscriber(dispatch.clone())),
            None => runtime.spawn(serve.with_current_subscriber()),
        };

        self.diagnostics(|| {
            tracing::debug!(address = %self.config.address, "HTTP server starting");
        });

        *slot = Slot::Serving(Serving { shutdown, task });
        Ok(RunHandle { ready: ready_rx })
    }

    /// Whether the server is currently accepting connections.
    pub fn running(&self) -> bool {
        self.state.is_running()
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Gracefully stop the server.
    ///
    /// Stops accepting, lets in-flight requests finish for up to
    /// `shutdown_timeout`, then aborts whatever is left. A zero timeout
    /// aborts immediately and is not treated as a failure. The server is not
    /// live once this returns, whatever the outcome.
    ///
    /// Calling it on a server that was never run, or after a previous close
    /// has finished, does nothing. Callers that overlap a close in progress
    /// wait for it and receive the same outcome.
    ///
    /// Failures are logged at error level. With `exit_on_shutdown_failure`
    /// set the process then exits with status 1; otherwise the error is returned.
    pub async fn close(&self) -> Result<(), ServerError> {
        let (Serving { shutdown, mut task }, done) = match self.claim_close() {
            CloseClaim::Owner(serving, done) => (serving, done),
            CloseClaim::Waiter(done) => return wait_for_close(done).await,
            CloseClaim::Nothing => return Ok(()),
        };

        let previous = self.state.begin_stop();
        let timeout = self.config.shutdown_timeout();
        self.diagnostics(|| {
            tracing::info!(
                address = %self.config.address,
                phase = ?previous,
                timeout_ms = timeout.as_millis() as u64,
                active_connections = self.tracker.active_count(),
                "Shutting down HTTP server"
            );
        });
        shutdown.trigger();

        let outcome = if timeout.is_zero() {
            task.abort();
            match task.await {
                Err(e) if e.is_panic() => Err(ServerError::Shutdown(e.to_string())),
                _ => Ok(()),
            }
        } else {
            match tokio::time::timeout(timeout, &mut task).await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ServerError::Shutdown(e.to_string())),
                Err(_) => {
                    task.abort();
                    let _ = task.await;
                    Err(ServerError::ShutdownTimeout(timeout))
                }
            }
        };

        self.state.mark_stopped();

        if let Err(e) = &outcome {
            self.diagnostics(|| {
                tracing::error!(
                    address = %self.config.address,
                    error = %e,
                    fatal = self.config.exit_on_shutdown_failure,
                    "HTTP server shutdown failed"
                );
            });
            if self.config.exit_on_shutdown_failure {
                std::process::exit(1);
            }
        }

        *self.lock_slot() = Slot::Empty;
        done.send_replace(Some(match &outcome {
            Ok(()) => Ok(()),
            Err(e) => Err(e.replay()),
        }));

        outcome
    }

    fn claim_close(&self) -> CloseClaim {
        let mut slot = self.lock_slot();
        match std::mem::replace(&mut *slot, Slot::Empty) {
            Slot::Serving(serving) => {
                let (done_tx, done_rx) = watch::channel(None);
                *slot = Slot::Closing(done_rx);
                CloseClaim::Owner(serving, done_tx)
            }
            Slot::Closing(done) => {
                *slot = Slot::Closing(done.clone());
                CloseClaim::Waiter(done)
            }
            Slot::Empty => CloseClaim::Nothing,
        }
    }

    /// Address the listener bound to, once `run` has succeeded.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Number of connections currently open.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// The configuration this server was built with.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the configured diagnostic sink as the default subscriber.
    fn diagnostics<T>(&self, f: impl FnOnce() -> T) -> T {
        match &self.dispatch {
            Some(dispatch) => tracing::dispatcher::with_default(dispatch, f),
            None => f(),
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Slot::Serving(Serving { shutdown, task }) = std::mem::replace(slot, Slot::Empty) {
            shutdown.trigger();
            task.abort();
            self.state.mark_stopped();
        }
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("config", &self.config)
            .field("phase", &self.state.phase())
            .field("local_addr", &self.local_addr.get())
            .finish_non_exhaustive()
    }
}

async fn wait_for_close(
    mut done: watch::Receiver<Option<Result<(), ServerError>>>,
) -> Result<(), ServerError> {
    match done.wait_for(Option::is_some).await {
        Ok(outcome) => match outcome.as_ref() {
            Some(Err(e)) => Err(e.replay()),
            _ => Ok(()),
        },
        Err(_) => Err(ServerError::Shutdown(
            "close in progress was cancelled".to_string(),
        )),
    }
}

/// Liveness of an optional server; `None` is never running.
pub fn is_running(server: Option<&HttpServer>) -> bool {
    server.is_some_and(HttpServer::running)
}

/// Close an optional server; `None` is a no-op.
pub async fn close(server: Option<&HttpServer>) -> Result<(), ServerError> {
    match server {
        Some(server) => server.close().await,
        None => Ok(()),
    }
}

/// Reports the outcome of the bind started by [`HttpServer::run`].
#[derive(Debug)]
pub struct RunHandle {
    ready: oneshot::Receiver<Result<SocketAddr, ServerError>>,
}

impl RunHandle {
    /// Wait until the listener is bound (or failed to bind).
    ///
    /// Yields [`ServerError::Stopped`] if the server was closed or dropped first.
    pub async fn ready(self) -> Result<SocketAddr, ServerError> {
        self.ready.await.unwrap_or(Err(ServerError::Stopped))
    }
}

/// Builder for [`HttpServer`].
///
/// Mutators apply in order. The first fallible mutator that fails is
/// remembered, later mutators are skipped, and `build` returns that error.
/// Validation happens once, in `build`.
#[derive(Debug)]
pub struct HttpServerBuilder {
    config: ServerConfig,
    router: Option<Router>,
    dispatch: Option<Dispatch>,
    error: Option<ServerError>,
}

impl HttpServerBuilder {
    fn new() -> Self {
        Self {
            config: ServerConfig {
                address: String::new(),
                ..ServerConfig::default()
            },
            router: None,
            dispatch: None,
            error: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(self, config: ServerConfig) -> Self {
        self.try_config(|current| {
            *current = config;
            Ok(())
        })
    }

    /// Load the configuration from a TOML file.
    pub fn config_file(self, path: impl AsRef<Path>) -> Self {
        self.try_config(|current| {
            *current = load_config(path.as_ref())?;
            Ok(())
        })
    }

    /// Apply a fallible mutation to the configuration.
    pub fn try_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&mut ServerConfig) -> Result<(), ServerError>,
    {
        if self.error.is_none() {
            if let Err(e) = f(&mut self.config) {
                self.error = Some(e);
            }
        }
        self
    }

    /// Bind address, e.g. `"127.0.0.1:0"`.
    pub fn address(self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.try_config(|config| {
            config.address = address;
            Ok(())
        })
    }

    /// Graceful shutdown bound; zero disables the grace period.
    pub fn shutdown_timeout(self, timeout: Duration) -> Self {
        let millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.try_config(|config| {
            config.shutdown_timeout_ms = millis;
            Ok(())
        })
    }

    /// Maximum concurrent connections.
    pub fn max_connections(self, max_connections: usize) -> Self {
        self.try_config(|config| {
            config.max_connections = max_connections;
            Ok(())
        })
    }

    /// Exit the process when graceful shutdown fails.
    pub fn exit_on_shutdown_failure(self, exit: bool) -> Self {
        self.try_config(|config| {
            config.exit_on_shutdown_failure = exit;
            Ok(())
        })
    }

    /// The router that handles every request.
    pub fn router(mut self, router: Router) -> Self {
        if self.error.is_none() {
            self.router = Some(router);
        }
        self
    }

    /// Any tower service as the request handler.
    pub fn service<S>(self, service: S) -> Self
    where
        S: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        S::Response: IntoResponse,
        S::Future: Send + 'static,
    {
        self.router(Router::new().fallback_service(service))
    }

    /// Diagnostic sink for this server. Defaults to the caller's subscriber.
    pub fn dispatch(mut self, dispatch: impl Into<Dispatch>) -> Self {
        if self.error.is_none() {
            self.dispatch = Some(dispatch.into());
        }
        self
    }

    /// Validate and construct the server.
    pub fn build(self) -> Result<HttpServer, ServerError> {
        if let Some(e) = self.error {
            return Err(e);
        }

        let mut errors = validate_config(&self.config).err().unwrap_or_default();
        let router = self.router;
        if router.is_none() {
            errors.push(ValidationError::MissingHandler);
        }
        let router = match router {
            Some(router) if errors.is_empty() => router,
            _ => return Err(ServerError::Configuration(errors)),
        };

        Ok(HttpServer {
            config: self.config,
            router,
            dispatch: self.dispatch,
            state: Arc::new(LifecycleState::new()),
            tracker: ConnectionTracker::new(),
            local_addr: Arc::new(OnceLock::new()),
            slot: Mutex::new(Slot::Empty),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    fn router() -> Router {
        Router::new().route("/", get(|| async { "ok" }))
    }

    #[test]
    fn missing_address_rejected() {
        let err = HttpServer::builder().router(router()).build().unwrap_err();
        match err {
            ServerError::Configuration(errors) => {
                assert_eq!(errors, vec![ValidationError::EmptyAddress]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_handler_rejected() {
        let err = HttpServer::builder()
            .address("127.0.0.1:0")
            .build()
            .unwrap_err();
        match err {
            ServerError::Configuration(errors) => {
                assert_eq!(errors, vec![ValidationError::MissingHandler]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn first_mutator_error_wins() {
        let err = HttpServer::builder()
            .try_config(|_| Err(ServerError::Shutdown("first".into())))
            .try_config(|_| Err(ServerError::Shutdown("second".into())))
            .address("127.0.0.1:0")
            .router(router())
            .build()
            .unwrap_err();
        assert!(matches!(err, ServerError::Shutdown(msg) if msg == "first"));
    }

    #[test]
    fn missing_config_file_short_circuits() {
        let err = HttpServer::builder()
            .config_file("/nonexistent/http-lifecycle.toml")
            .router(router())
            .build()
            .unwrap_err();
        assert!(matches!(err, ServerError::ConfigFile(_)));
    }

    #[test]
    fn host_name_addresses_build() {
        for address in ["localhost:0", ":8080"] {
            let server = HttpServer::builder()
                .address(address)
                .router(router())
                .build()
                .unwrap();
            assert_eq!(server.config().address, address);
        }

        let err = HttpServer::builder()
            .address("localhost")
            .router(router())
            .build()
            .unwrap_err();
        assert!(matches!(err, ServerError::Configuration(_)));
    }

    #[test]
    fn built_server_is_not_running() {
        let server = HttpServer::builder()
            .address("127.0.0.1:0")
            .shutdown_timeout(Duration::from_millis(1500))
            .router(router())
            .build()
            .unwrap();
        assert!(!server.running());
        assert_eq!(server.phase(), Phase::Idle);
        assert_eq!(server.local_addr(), None);
        assert_eq!(server.config().shutdown_timeout_ms, 1500);
    }

    #[test]
    fn none_is_never_running() {
        assert!(!is_running(None));
    }

    #[test]
    fn run_without_runtime_fails() {
        let server = HttpServer::new(
            ServerConfig {
                address: "127.0.0.1:0".into(),
                ..ServerConfig::default()
            },
            router(),
        )
        .unwrap();
        assert!(matches!(server.run(), Err(ServerError::NoRuntime)));
        assert_eq!(server.phase(), Phase::Idle);
    }

    #[tokio::test]
    async fn close_before_run_is_noop() {
        let server = HttpServer::builder()
            .address("127.0.0.1:0")
            .router(router())
            .build()
            .unwrap();
        server.close().await.unwrap();
        assert!(!server.running());
        assert_eq!(server.phase(), Phase::Idle);
        close(None).await.unwrap();
    }
}
