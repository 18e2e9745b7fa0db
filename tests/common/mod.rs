//! Shared utilities for lifecycle integration tests.

use std::future::Future;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{routing::get, Router};
use tokio::sync::Notify;
use tracing::Dispatch;

/// Log sink that keeps everything written to it.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl CapturedLogs {
    pub fn new() -> Self {
        Self::default()
    }

    /// A dispatcher writing plain-text events at every level into this sink.
    pub fn dispatch(&self) -> Dispatch {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish()
            .into()
    }

    pub fn contents(&self) -> String {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Router with `/` answering immediately, `/slow` answering after `slow_for`,
/// and `/hang` never answering. Both slow routes notify `entered` on arrival.
#[allow(dead_code)]
pub fn test_router(entered: Arc<Notify>, slow_for: Duration) -> Router {
    let slow_entered = entered.clone();
    Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            "/slow",
            get(move || {
                let entered = slow_entered.clone();
                async move {
                    entered.notify_one();
                    tokio::time::sleep(slow_for).await;
                    "done"
                }
            }),
        )
        .route(
            "/hang",
            get(move || {
                let entered = entered.clone();
                async move {
                    entered.notify_one();
                    std::future::pending::<()>().await;
                    "unreachable"
                }
            }),
        )
}

/// Poll `condition` until it holds or `within` elapses.
#[allow(dead_code)]
pub async fn eventually<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + within;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Check that `condition` holds for the whole window.
#[allow(dead_code)]
pub async fn holds_for<F>(window: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + window;
    while Instant::now() < deadline {
        if !condition() {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    true
}

/// Await `fut`, returning how long it took.
#[allow(dead_code)]
pub async fn timed<F: Future>(fut: F) -> (F::Output, Duration) {
    let start = Instant::now();
    let out = fut.await;
    (out, start.elapsed())
}

/// HTTP client that never reuses connections.
#[allow(dead_code)]
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
