//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the global tracing subscriber
//! - Build standalone dispatchers for per-server diagnostic sinks
//!
//! Log level comes from `RUST_LOG`, falling back to the given default filter.

use tracing::Dispatch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into())
}

/// Install the global subscriber.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok()
}

/// A dispatcher that is not installed globally, for
/// [`HttpServerBuilder::dispatch`](crate::http::HttpServerBuilder::dispatch).
pub fn dispatch(default_filter: &str) -> Dispatch {
    tracing_subscriber::registry()
        .with(env_filter(default_filter))
        .with(tracing_subscriber::fmt::layer())
        .into()
}
