//! Cooperative cancellation primitives
//!
//! A [`CancelToken`] is a cloneable set-once flag. There is deliberately no
//! way to clear a token: the host-wide exit token must stay set once raised,
//! and per-run tokens are replaced with a fresh allocation on every restart
//! instead of being reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable set-once cancellation flag
///
/// Clones observe the same underlying flag. `cancel()` is idempotent.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a new, unset token
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag; observers see it on their next check
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the flag has been raised
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The composed stop signal a running work body observes
///
/// Stop is requested when any of the three layers is set: the host-wide exit
/// token (set once, never unset), the per-run token (replaced on restart),
/// or an optional caller-supplied token.
#[derive(Debug, Clone)]
pub struct StopSignal {
    /// Host-wide exit token
    pub exit: CancelToken,
    /// Per-run token for this specific run
    pub run: CancelToken,
    /// Optional caller-supplied token
    pub caller: Option<CancelToken>,
}

impl StopSignal {
    /// Whether any layer has requested a stop
    pub fn is_stopped(&self) -> bool {
        self.exit.is_cancelled()
            || self.run.is_cancelled()
            || self.caller.as_ref().is_some_and(|t| t.is_cancelled())
    }
}
