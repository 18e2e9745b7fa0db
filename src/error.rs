//! Server lifecycle error taxonomy.

use std::time::Duration;

use thiserror::Error;

use crate::config::loader::join_errors;
use crate::config::{ConfigError, ValidationError};

/// Errors produced while building, running or stopping an [`HttpServer`].
///
/// [`HttpServer`]: crate::http::HttpServer
#[derive(Debug, Error)]
pub enum ServerError {
    /// The builder was given an invalid configuration or no handler.
    #[error("invalid server configuration: {}", join_errors(.0))]
    Configuration(Vec<ValidationError>),

    /// A configuration file could not be loaded.
    #[error("failed to load configuration file: {0}")]
    ConfigFile(#[from] ConfigError),

    /// The listener could not acquire its address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// `run` was called on a server that has already been started.
    #[error("server has already been started")]
    AlreadyRunning,

    /// `run` was called outside of a Tokio runtime.
    #[error("no Tokio runtime available to run the server")]
    NoRuntime,

    /// The serve task failed while shutting down.
    #[error("shutdown failed: {0}")]
    Shutdown(String),

    /// In-flight connections did not drain before the deadline.
    #[error("graceful shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// The server stopped before reporting a bind result.
    #[error("server stopped before it started listening")]
    Stopped,
}

impl ServerError {
    /// Copy of a shutdown outcome for `close` callers that waited on
    /// another caller's shutdown.
    pub(crate) fn replay(&self) -> ServerError {
        match self {
            ServerError::ShutdownTimeout(timeout) => ServerError::ShutdownTimeout(*timeout),
            ServerError::Shutdown(reason) => ServerError::Shutdown(reason.clone()),
            other => ServerError::Shutdown(other.to_string()),
        }
    }
}
