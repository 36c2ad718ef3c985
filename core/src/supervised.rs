//! The supervised-process side of the watchdog contract
//!
//! A process launched by the watchdog runs a [`ProcessLifecycle`] and calls
//! [`Liveness::set_active`] from its main loop. Each beat refreshes the
//! stamp file the watchdog reads, verifies the recorded parent process
//! still exists, and enforces the absolute run timeout. When the process
//! must go away, the beat returns an error so the caller unwinds cleanly,
//! and a forced exit is armed after a short grace period in case it does
//! not.

use crate::cancel::CancelToken;
use crate::host::HostExit;
use crate::liveness::Liveness;
use crate::stamp::StampFile;
use crate::{CoreError, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// Construction parameters for a [`ProcessLifecycle`]
pub struct ProcessLifecycleConfig {
    /// Stamp file to refresh on every beat; `None` disables the stamp
    pub stamp_path: Option<PathBuf>,
    /// Parent process to watch; 0 disables the check
    pub parent_pid: u32,
    /// Absolute run timeout; `None` disables the check
    pub run_timeout: Option<Duration>,
    /// Grace period between the clean-shutdown signal and the forced exit
    pub exit_grace: Duration,
    /// Host exit implementation
    pub host: Arc<dyn HostExit>,
}

impl ProcessLifecycleConfig {
    /// Config with a 2 s grace period and the real host exit
    #[cfg(unix)]
    pub fn new(stamp_path: Option<PathBuf>, parent_pid: u32, run_timeout: Option<Duration>) -> Self {
        Self {
            stamp_path,
            parent_pid,
            run_timeout,
            exit_grace: Duration::from_secs(2),
            host: Arc::new(crate::host::ProcessHostExit),
        }
    }
}

/// Liveness bookkeeping for a supervised external process
pub struct ProcessLifecycle {
    stamp: Option<StampFile>,
    parent_pid: u32,
    run_timeout: Option<Duration>,
    exit_grace: Duration,
    host: Arc<dyn HostExit>,
    started: Instant,
    exit: CancelToken,
    forced_exit_armed: AtomicBool,
    pause_depth: AtomicU32,
}

impl ProcessLifecycle {
    /// Create the lifecycle; the run clock starts now
    pub fn new(config: ProcessLifecycleConfig) -> Arc<Self> {
        Arc::new(Self {
            stamp: config.stamp_path.map(StampFile::new),
            parent_pid: config.parent_pid,
            run_timeout: config.run_timeout,
            exit_grace: config.exit_grace,
            host: config.host,
            started: Instant::now(),
            exit: CancelToken::new(),
            forced_exit_armed: AtomicBool::new(false),
            pause_depth: AtomicU32::new(0),
        })
    }

    /// The process-local exit token; raised when the beat decides the
    /// process must go away
    pub fn exit_token(&self) -> &CancelToken {
        &self.exit
    }

    /// Time since the lifecycle was created
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Arm a forced exit after the grace period, once
    ///
    /// The clean path is the `Err` returned from the beat; this is the
    /// backup when the caller fails to unwind.
    fn arm_forced_exit(&self, code: i32) {
        if self.forced_exit_armed.swap(true, Ordering::SeqCst) {
            return;
        }
        let grace = self.exit_grace;
        let host = Arc::clone(&self.host);
        std::thread::spawn(move || {
            std::thread::sleep(grace);
            host.force_exit(code);
        });
    }

    fn parent_gone(&self) -> bool {
        #[cfg(unix)]
        {
            self.parent_pid > 0 && !crate::process::is_process_alive(self.parent_pid)
        }
        #[cfg(not(unix))]
        {
            false
        }
    }
}

impl Liveness for ProcessLifecycle {
    fn set_active(&self) -> Result<()> {
        // The stamp is refreshed first so the watchdog keeps seeing a live
        // process even while this beat decides to shut down.
        if let Some(stamp) = &self.stamp {
            if let Err(e) = stamp.touch() {
                warn!("Could not refresh stamp {}: {e}", stamp.path().display());
            }
        }

        if self.exit.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        if self.parent_gone() {
            warn!(
                "Parent process {} is gone; shutting down",
                self.parent_pid
            );
            self.exit.cancel();
            self.arm_forced_exit(0);
            return Err(CoreError::Cancelled);
        }

        if let Some(limit) = self.run_timeout {
            if self.started.elapsed() > limit {
                error!("Run timeout {limit:?} exceeded; shutting down");
                self.exit.cancel();
                self.arm_forced_exit(1);
                return Err(CoreError::Timeout(limit));
            }
        }

        Ok(())
    }

    fn pause_checks(&self) {
        self.pause_depth.fetch_add(1, Ordering::SeqCst);
    }

    fn resume_checks(&self) {
        let _ = self
            .pause_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHostExit;
    use std::thread;

    fn config(host: Arc<MockHostExit>) -> ProcessLifecycleConfig {
        ProcessLifecycleConfig {
            stamp_path: None,
            parent_pid: 0,
            run_timeout: None,
            exit_grace: Duration::from_millis(20),
            host,
        }
    }

    #[test]
    fn beat_refreshes_the_stamp() {
        let dir = tempfile::tempdir().unwrap();
        let stamp_path = dir.path().join("agent.stamp");
        let host = Arc::new(MockHostExit::new());
        let mut cfg = config(Arc::clone(&host));
        cfg.stamp_path = Some(stamp_path.clone());
        let lifecycle = ProcessLifecycle::new(cfg);

        lifecycle.set_active().unwrap();
        let stamp = StampFile::new(stamp_path);
        assert!(stamp.age().unwrap() < Duration::from_secs(2));
    }

    #[test]
    fn gone_parent_requests_clean_exit_then_forces() {
        let host = Arc::new(MockHostExit::new());
        let mut cfg = config(Arc::clone(&host));
        cfg.parent_pid = 999_999_999; // does not exist
        let lifecycle = ProcessLifecycle::new(cfg);

        match lifecycle.set_active() {
            Err(CoreError::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }
        assert!(lifecycle.exit_token().is_cancelled());

        // a later beat keeps reporting the shutdown
        assert!(matches!(lifecycle.set_active(), Err(CoreError::Cancelled)));

        // the forced-exit backup fires after the grace period
        thread::sleep(Duration::from_millis(80));
        assert_eq!(host.calls(), vec![0]);
    }

    #[test]
    fn live_parent_passes() {
        let host = Arc::new(MockHostExit::new());
        let mut cfg = config(Arc::clone(&host));
        cfg.parent_pid = std::process::id();
        let lifecycle = ProcessLifecycle::new(cfg);

        lifecycle.set_active().unwrap();
        assert!(!lifecycle.exit_token().is_cancelled());
    }

    #[test]
    fn run_timeout_forces_exit() {
        let host = Arc::new(MockHostExit::new());
        let mut cfg = config(Arc::clone(&host));
        cfg.run_timeout = Some(Duration::from_millis(10));
        let lifecycle = ProcessLifecycle::new(cfg);

        thread::sleep(Duration::from_millis(30));
        match lifecycle.set_active() {
            Err(CoreError::Timeout(_)) => {}
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert!(lifecycle.exit_token().is_cancelled());

        thread::sleep(Duration::from_millis(80));
        assert_eq!(host.calls(), vec![1]);
    }

    #[test]
    fn forced_exit_is_armed_once() {
        let host = Arc::new(MockHostExit::new());
        let mut cfg = config(Arc::clone(&host));
        cfg.parent_pid = 999_999_999;
        let lifecycle = ProcessLifecycle::new(cfg);

        let _ = lifecycle.set_active();
        let _ = lifecycle.set_active();
        let _ = lifecycle.set_active();

        thread::sleep(Duration::from_millis(80));
        assert_eq!(host.calls().len(), 1);
    }

    #[test]
    fn pause_depth_nests() {
        let host = Arc::new(MockHostExit::new());
        let lifecycle = ProcessLifecycle::new(config(host));
        lifecycle.pause_checks();
        lifecycle.pause_checks();
        lifecycle.resume_checks();
        lifecycle.resume_checks();
        lifecycle.resume_checks(); // no underflow
        assert!(lifecycle.set_active().is_ok());
    }
}
