//! Lifecycle wrapper for a background HTTP server.
//!
//! Assembles a server from configuration and an injected router, starts it
//! on a Tokio task, reports liveness, and shuts it down gracefully within a
//! bounded timeout.

pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::ServerConfig;
pub use error::ServerError;
pub use http::{HttpServer, HttpServerBuilder, RunHandle};
pub use lifecycle::Phase;
