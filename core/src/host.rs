//! Host exit seam
//!
//! The watchdog and the supervised-process lifecycle escalate to a forced
//! host exit through this trait instead of calling `std::process::exit`
//! directly, so escalation paths are testable.

use parking_lot::Mutex;

/// Terminates the current host process
pub trait HostExit: Send + Sync {
    /// Force the host process to exit with `code`
    ///
    /// The real implementation does not return; mocks record the call and
    /// do, so escalation logic can be driven in tests.
    fn force_exit(&self, code: i32);
}

/// Real implementation: `std::process::exit`
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessHostExit;

impl HostExit for ProcessHostExit {
    fn force_exit(&self, code: i32) {
        tracing::error!("Forcing host exit with code {code}");
        std::process::exit(code);
    }
}

/// Recording mock: collects exit codes instead of exiting
#[derive(Debug, Default)]
pub struct MockHostExit {
    calls: Mutex<Vec<i32>>,
}

impl MockHostExit {
    /// Create a mock with no recorded calls
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit codes recorded so far, in order
    pub fn calls(&self) -> Vec<i32> {
        self.calls.lock().clone()
    }

    /// Whether a forced exit was requested at all
    pub fn exited(&self) -> bool {
        !self.calls.lock().is_empty()
    }
}

impl HostExit for MockHostExit {
    fn force_exit(&self, code: i32) {
        self.calls.lock().push(code);
    }
}
