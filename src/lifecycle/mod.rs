//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! state.rs:
//!     Idle → Starting → Serving → Stopping → Stopped
//!
//! shutdown.rs:
//!     close() → trigger → accept loop stops → connections drain
//! ```
//!
//! # Design Decisions
//! - Liveness is read lock-free from the atomic phase
//! - Shutdown has a deadline: connections are aborted after it

pub mod shutdown;
pub mod state;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use state::{LifecycleState, Phase};
