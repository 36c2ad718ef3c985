//! Core functionality for the Vigil supervision framework
//!
//! Vigil runs long-lived units of work, in-process workers and external
//! child processes, and guarantees they either keep making progress or are
//! detected and recovered. The pieces:
//!
//! - [`worker::Worker`]: state machine for one unit of repeatable work,
//!   with compare-and-swap status transitions and composed cooperative
//!   cancellation
//! - [`watchdog::Watchdog`]: the supervisory loop restarting stalled
//!   workers and stray or silent external processes
//! - [`process::ProcessLauncher`]: staging, launching, and graded shutdown
//!   of external process instances
//! - [`supervised::ProcessLifecycle`]: the in-child mirror of the watchdog
//!   contract (stamp refresh, parent check, run timeout)
//! - [`sync`], [`cancel`], [`liveness`]: the guard, cancellation, and
//!   heartbeat plumbing everything above is built on

pub mod cancel;
pub mod classify;
pub mod config;
pub mod error;
pub mod host;
pub mod liveness;
pub mod process;
pub mod stamp;
pub mod supervised;
pub mod sync;
pub mod watchdog;
pub mod worker;

pub use cancel::{CancelToken, StopSignal};
pub use classify::{default_classifier, FailureClassifier};
pub use config::{SettingsSource, TomlSettings, WatchdogSettings};
pub use error::{CoreError, Result, WorkError};
pub use host::{HostExit, MockHostExit, ProcessHostExit};
pub use liveness::{pause_scope, Liveness, LivenessRelay, PauseGuard};
pub use stamp::StampFile;
pub use supervised::{ProcessLifecycle, ProcessLifecycleConfig};
pub use sync::{Semaphore, SemaphorePermit, TimedMutex, TimedRwLock};
pub use watchdog::{HealthCheck, Watchdog};
pub use worker::{WorkFn, Worker, WorkerConfig};

// Re-export schema types for convenience
pub use schema::{FailureKind, ProcessSpec, TimeoutPolicy, WorkerStatus};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::ConfigurationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
