//! Server lifecycle state machine.
//!
//! # States
//! ```text
//! Idle → Starting            run() scheduled the serve task
//! Starting → Serving         listener bound, accepting connections
//! Starting → Idle            bind failed, run() may be retried
//! Starting|Serving → Stopping   close() delivered the stop signal
//! Stopping → Stopped         serve task finished or was aborted
//! Serving → Stopped          serve task exited on its own
//! ```
//!
//! Liveness is derived from the phase: only `Serving` is live. Every
//! transition out of `Starting` is a compare-and-swap, so a bind that
//! completes after `close()` began can never flip the server back to live.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle phase of a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Idle = 0,
    Starting = 1,
    Serving = 2,
    Stopping = 3,
    Stopped = 4,
}

impl Phase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Phase::Idle,
            1 => Phase::Starting,
            2 => Phase::Serving,
            3 => Phase::Stopping,
            _ => Phase::Stopped,
        }
    }
}

/// Atomic lifecycle phase shared between the owner and the serve task.
#[derive(Debug)]
pub struct LifecycleState {
    phase: AtomicU8,
}

impl LifecycleState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Idle as u8),
        }
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::SeqCst))
    }

    /// Liveness flag: true only while the listener is accepting.
    pub fn is_running(&self) -> bool {
        self.phase() == Phase::Serving
    }

    /// Idle → Starting. Fails with the current phase otherwise.
    pub fn begin_start(&self) -> Result<(), Phase> {
        self.transition(Phase::Idle, Phase::Starting)
    }

    /// Starting → Serving, after a successful bind.
    pub fn mark_serving(&self) -> bool {
        self.transition(Phase::Starting, Phase::Serving).is_ok()
    }

    /// Starting → Idle, after a failed bind.
    pub fn mark_bind_failed(&self) -> bool {
        self.transition(Phase::Starting, Phase::Idle).is_ok()
    }

    /// Move to Stopping if a start is in progress or the server is live.
    /// Returns the phase observed before the call.
    pub fn begin_stop(&self) -> Phase {
        let mut current = self.phase();
        loop {
            if !matches!(current, Phase::Starting | Phase::Serving) {
                return current;
            }
            match self.transition(current, Phase::Stopping) {
                Ok(()) => return current,
                Err(actual) => current = actual,
            }
        }
    }

    /// Serving → Stopped, when the serve task ends without a close request.
    pub fn mark_exited(&self) -> bool {
        self.transition(Phase::Serving, Phase::Stopped).is_ok()
    }

    /// Terminal state; always succeeds.
    pub fn mark_stopped(&self) {
        self.phase.store(Phase::Stopped as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: Phase, to: Phase) -> Result<(), Phase> {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(Phase::from_u8)
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}
