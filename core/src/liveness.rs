//! The liveness contract: heartbeats and staleness-check suspension
//!
//! Any long-running body hosted by the core calls [`Liveness::set_active`]
//! as its cooperative checkpoint. Components that wrap another
//! liveness-bearing component forward the whole contract upward through a
//! [`LivenessRelay`], so a heartbeat recorded deep inside a composed
//! pipeline is visible to the outermost watchdog-registered object.

use crate::Result;
use parking_lot::RwLock;
use std::sync::Arc;

/// Minimal heartbeat interface
pub trait Liveness: Send + Sync {
    /// Record progress. Returns an error when the caller should unwind:
    /// [`crate::CoreError::Cancelled`] once the effective stop signal is
    /// set, [`crate::CoreError::Timeout`] once the absolute run timeout has
    /// elapsed.
    fn set_active(&self) -> Result<()>;

    /// Temporarily suspend staleness judgement, for legitimately slow
    /// operations. Calls nest.
    fn pause_checks(&self);

    /// Resume staleness judgement after a matching [`Liveness::pause_checks`]
    fn resume_checks(&self);
}

/// Forwards the liveness contract to a configurable upstream caller
///
/// With no upstream configured, `set_active` is a no-op success and
/// pause/resume do nothing, so components can be composed before wiring.
#[derive(Default)]
pub struct LivenessRelay {
    upstream: RwLock<Option<Arc<dyn Liveness>>>,
}

impl LivenessRelay {
    /// Create a relay with no upstream
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain this relay to `upstream`
    pub fn set_upstream(&self, upstream: Arc<dyn Liveness>) {
        *self.upstream.write() = Some(upstream);
    }

    /// Drop the upstream link
    pub fn clear_upstream(&self) {
        *self.upstream.write() = None;
    }
}

impl Liveness for LivenessRelay {
    fn set_active(&self) -> Result<()> {
        match self.upstream.read().as_ref() {
            Some(upstream) => upstream.set_active(),
            None => Ok(()),
        }
    }

    fn pause_checks(&self) {
        if let Some(upstream) = self.upstream.read().as_ref() {
            upstream.pause_checks();
        }
    }

    fn resume_checks(&self) {
        if let Some(upstream) = self.upstream.read().as_ref() {
            upstream.resume_checks();
        }
    }
}

/// RAII guard that resumes checks on drop
pub struct PauseGuard<'a> {
    liveness: &'a dyn Liveness,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.liveness.resume_checks();
    }
}

/// Pause staleness checks for the lifetime of the returned guard
pub fn pause_scope(liveness: &dyn Liveness) -> PauseGuard<'_> {
    liveness.pause_checks();
    PauseGuard { liveness }
}
