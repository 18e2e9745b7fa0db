//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Lifecycle events (bind, listening, draining, shutdown failure)
//!     → tracing events with structured fields
//!     → per-server Dispatch if configured, global subscriber otherwise
//! ```

pub mod logging;

pub use logging::{dispatch, init_logging};
