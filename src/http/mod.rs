//! HTTP server subsystem.
//!
//! # Data Flow
//! ```text
//! HttpServer::builder() → validate → HttpServer
//!     run()   → serve.rs task: bind → accept loop → hyper connection per stream
//!     close() → stop signal → drain connections → abort at deadline
//! ```

mod serve;
pub mod server;

pub use server::{close, is_running, HttpServer, HttpServerBuilder, RunHandle};
