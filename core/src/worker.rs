//! The worker lifecycle state machine
//!
//! One [`Worker`] wraps one logical unit of repeatable work. Status
//! transitions are compare-and-swap on an atomic code, so concurrent
//! `request`/`cancel` calls and the body's own completion resolve
//! deterministically: whichever call observes the expected prior state wins,
//! the loser either joins the winner's outcome or is rejected.
//!
//! The running body calls [`Liveness::set_active`] as its cooperative
//! checkpoint: it records the heartbeat the watchdog reads, observes the
//! composed stop signal, and enforces the absolute run timeout. Code that
//! never calls it cannot be cooperatively cancelled.

use crate::cancel::{CancelToken, StopSignal};
use crate::classify::{default_classifier, FailureClassifier};
use crate::liveness::Liveness;
use crate::sync::TimedRwLock;
use crate::{CoreError, Result, WorkError};
use parking_lot::Mutex;
use schema::{FailureKind, TimeoutPolicy, WorkerStatus};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Poll interval while waiting for a cancelled body to yield
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Cancel/restart bound when neither the caller nor the policy supplies one
const DEFAULT_CANCEL_TIMEOUT: Duration = Duration::from_secs(30);

/// Sleep before restart eligibility for `RetryAfterDelay` failures when the
/// policy has no restart delay
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// The work body: invoked once per run, expected to call
/// [`Liveness::set_active`] on the worker frequently
pub type WorkFn = Arc<dyn Fn(&Worker) -> std::result::Result<(), WorkError> + Send + Sync>;

/// Construction parameters for a [`Worker`]
pub struct WorkerConfig {
    /// Worker name, used in logs and as the thread name
    pub name: String,
    /// Timeout tunables; unset fields use built-in defaults
    pub timeouts: TimeoutPolicy,
    /// Host-wide exit token shared with the watchdog
    pub exit: CancelToken,
    /// Optional caller-supplied cancellation layer
    pub caller_token: Option<CancelToken>,
    /// Failure classifier; defaults to [`default_classifier`]
    pub classifier: Option<FailureClassifier>,
}

impl WorkerConfig {
    /// Config with defaults: no timeouts, a fresh exit token, no caller
    /// token, the default classifier
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeouts: TimeoutPolicy::default(),
            exit: CancelToken::new(),
            caller_token: None,
            classifier: None,
        }
    }
}

/// How the current run was started; restarts re-use the same form
#[derive(Clone)]
enum ExecMode {
    /// Dedicated OS thread
    Thread,
    /// Slot on a tokio runtime's blocking pool
    Pooled(tokio::runtime::Handle),
}

/// State machine wrapping one logical unit of repeatable work
pub struct Worker {
    name: String,
    status: AtomicU8,
    error_flag: AtomicBool,
    pause_depth: AtomicU32,
    heartbeat: TimedRwLock<Instant>,
    run_started: TimedRwLock<Option<Instant>>,
    run_token: TimedRwLock<CancelToken>,
    exit: CancelToken,
    caller_token: Option<CancelToken>,
    timeouts: TimeoutPolicy,
    classifier: FailureClassifier,
    work: WorkFn,
    exec_mode: Mutex<Option<ExecMode>>,
}

impl Worker {
    /// Create a worker around `work`
    pub fn new(config: WorkerConfig, work: WorkFn) -> Arc<Self> {
        Arc::new(Self {
            name: config.name,
            status: AtomicU8::new(WorkerStatus::Available.as_code()),
            error_flag: AtomicBool::new(false),
            pause_depth: AtomicU32::new(0),
            heartbeat: TimedRwLock::new(Instant::now()),
            run_started: TimedRwLock::new(None),
            run_token: TimedRwLock::new(CancelToken::new()),
            exit: config.exit,
            caller_token: config.caller_token,
            timeouts: config.timeouts,
            classifier: config.classifier.unwrap_or_else(default_classifier),
            work,
            exec_mode: Mutex::new(None),
        })
    }

    /// Worker name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current status (decoded from the atomic code)
    pub fn status(&self) -> WorkerStatus {
        let code = self.status.load(Ordering::SeqCst);
        WorkerStatus::from_code(code).expect("status field only ever holds WorkerStatus codes")
    }

    fn cas_status(&self, from: WorkerStatus, to: WorkerStatus) -> bool {
        self.status
            .compare_exchange(
                from.as_code(),
                to.as_code(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Commit a start: `Available -> Requested`. Returns false in any other
    /// state.
    ///
    /// A fresh per-run cancellation token is installed on every successful
    /// request. The swap is safe here and only here: no run is active
    /// between `Available` and `Requested`, so a raised cancel signal can
    /// never be clobbered.
    pub fn request(&self) -> bool {
        let won = self.cas_status(WorkerStatus::Available, WorkerStatus::Requested);
        if won {
            *self.run_token.write() = CancelToken::new();
            debug!("Worker '{}' requested", self.name);
        } else {
            debug!(
                "Worker '{}' request rejected in state {}",
                self.name,
                self.status()
            );
        }
        won
    }

    /// Start the work body on a dedicated OS thread; performs the request
    /// implicitly
    pub fn start_thread(self: &Arc<Self>) -> Result<()> {
        if !self.request() {
            return Err(CoreError::InvalidState(format!(
                "worker '{}' is {}",
                self.name,
                self.status()
            )));
        }
        self.spawn(ExecMode::Thread)
    }

    /// Start the work body on a tokio runtime's blocking pool; requires a
    /// prior successful [`Worker::request`]
    pub fn start_pooled(self: &Arc<Self>, handle: &tokio::runtime::Handle) -> Result<()> {
        if self.status() != WorkerStatus::Requested {
            return Err(CoreError::InvalidState(format!(
                "worker '{}' must be requested before a pooled start (is {})",
                self.name,
                self.status()
            )));
        }
        self.spawn(ExecMode::Pooled(handle.clone()))
    }

    /// Run the work body synchronously on the calling thread; requires
    /// `Available`
    pub fn run_direct(self: &Arc<Self>) -> Result<()> {
        if !self.request() {
            return Err(CoreError::InvalidState(format!(
                "worker '{}' is {}",
                self.name,
                self.status()
            )));
        }
        self.run_body();
        Ok(())
    }

    fn spawn(self: &Arc<Self>, mode: ExecMode) -> Result<()> {
        let worker = Arc::clone(self);
        let spawned = match &mode {
            ExecMode::Thread => thread::Builder::new()
                .name(self.name.clone())
                .spawn(move || worker.run_body())
                .map(|_| ())
                .map_err(|e| {
                    CoreError::Other(format!("spawn failed for worker '{}': {e}", self.name))
                }),
            ExecMode::Pooled(handle) => {
                handle.spawn_blocking(move || worker.run_body());
                Ok(())
            }
        };

        match spawned {
            Ok(()) => {
                *self.exec_mode.lock() = Some(mode);
                Ok(())
            }
            Err(e) => {
                // roll the commit back so the worker is not stuck Requested
                self.cas_status(WorkerStatus::Requested, WorkerStatus::Available);
                Err(e)
            }
        }
    }

    /// The run wrapper: transition in, execute, classify, and always
    /// complete the state machine
    fn run_body(&self) {
        if !self.cas_status(WorkerStatus::Requested, WorkerStatus::Running) {
            debug!(
                "Worker '{}' run overtaken in state {}",
                self.name,
                self.status()
            );
            return;
        }
        *self.heartbeat.write() = Instant::now();
        *self.run_started.write() = Some(Instant::now());
        debug!("Worker '{}' running", self.name);

        let outcome = catch_unwind(AssertUnwindSafe(|| (self.work.as_ref())(self)));
        match outcome {
            Ok(Ok(())) => debug!("Worker '{}' body completed", self.name),
            Ok(Err(error)) => self.handle_failure(error),
            Err(panic) => {
                error!(
                    "Worker '{}' body panicked: {}",
                    self.name,
                    panic_message(panic.as_ref())
                );
                self.error_flag.store(true, Ordering::SeqCst);
            }
        }

        // Completion always runs, whatever the body did, so the state
        // machine can never stay stuck in Running.
        self.set_completed();
    }

    fn handle_failure(&self, error: WorkError) {
        if error
            .downcast_ref::<CoreError>()
            .is_some_and(CoreError::is_cancelled)
        {
            debug!("Worker '{}' observed cancellation", self.name);
            return;
        }

        match (self.classifier.as_ref())(&error) {
            FailureKind::ResourceExhaustion => {
                error!(
                    "Worker '{}' exhausted resources: {error}; requesting host exit",
                    self.name
                );
                self.exit.cancel();
            }
            FailureKind::StaleState => {
                info!(
                    "Worker '{}' hit stale state: {error}; eligible for immediate restart",
                    self.name
                );
            }
            FailureKind::RetryAfterDelay => {
                let delay = self.timeouts.restart_delay().unwrap_or(DEFAULT_RETRY_DELAY);
                warn!(
                    "Worker '{}' hit a temporary condition: {error}; retrying after {delay:?}",
                    self.name
                );
                thread::sleep(delay);
            }
            FailureKind::Retry => {
                debug!(
                    "Worker '{}' hit a temporary condition: {error}; eligible for restart",
                    self.name
                );
            }
            FailureKind::Unclassified => {
                error!("Worker '{}' failed: {error}", self.name);
                self.error_flag.store(true, Ordering::SeqCst);
            }
        }
    }

    fn set_completed(&self) {
        *self.run_started.write() = None;
        if self.cas_status(WorkerStatus::Running, WorkerStatus::Available) {
            debug!("Worker '{}' back to available", self.name);
            return;
        }
        if self.cas_status(WorkerStatus::Cancelling, WorkerStatus::Available) {
            // this transition is what an in-flight cancel's poll observes
            debug!("Worker '{}' cancel completed", self.name);
            return;
        }
        debug!(
            "Worker '{}' completion left state {}",
            self.name,
            self.status()
        );
    }

    /// Cancel the current run cooperatively
    ///
    /// Never-started workers return success immediately. A worker already
    /// mid-cancellation is joined rather than signalled a second time.
    /// Returns whether the body yielded within the bound (`timeout`, else
    /// the policy's restart timeout, else a built-in default).
    pub fn cancel(&self, timeout: Option<Duration>) -> bool {
        let bound = timeout
            .or(self.timeouts.restart_timeout())
            .unwrap_or(DEFAULT_CANCEL_TIMEOUT);

        loop {
            match self.status() {
                WorkerStatus::Available | WorkerStatus::Aborted => return true,
                WorkerStatus::Requested => {
                    // uncommit a start whose body has not begun; on a lost
                    // race the body is now running and the next iteration
                    // handles it
                    if self.cas_status(WorkerStatus::Requested, WorkerStatus::Available) {
                        debug!("Worker '{}' start uncommitted by cancel", self.name);
                        return true;
                    }
                }
                WorkerStatus::Running => {
                    if self.cas_status(WorkerStatus::Running, WorkerStatus::Cancelling) {
                        self.run_token.read().cancel();
                        debug!("Worker '{}' cancelling", self.name);
                    }
                    return self.await_available(bound);
                }
                WorkerStatus::Cancelling => {
                    debug!("Worker '{}' joining in-flight cancellation", self.name);
                    return self.await_available(bound);
                }
            }
        }
    }

    fn await_available(&self, bound: Duration) -> bool {
        let deadline = Instant::now() + bound;
        loop {
            if self.status() == WorkerStatus::Available {
                return true;
            }
            if Instant::now() >= deadline {
                warn!(
                    "Worker '{}' did not yield within {bound:?} (state {})",
                    self.name,
                    self.status()
                );
                return false;
            }
            thread::sleep(CANCEL_POLL_INTERVAL);
        }
    }

    /// Last resort: cooperative cancel first (unless disabled), then a
    /// forced stop
    ///
    /// In-process forced termination is not supported on this runtime, so a
    /// failed cancel flips the status to `Aborted` and returns `false`
    /// rather than pretending success. An aborted worker rejects requests
    /// until [`Worker::reset`]; escalation to host exit is the watchdog's
    /// decision.
    pub fn abort(&self, try_cancel_first: bool) -> bool {
        if try_cancel_first && self.cancel(None) {
            return true;
        }
        if self.status() == WorkerStatus::Available {
            return true;
        }

        let prev = self.status.swap(WorkerStatus::Aborted.as_code(), Ordering::SeqCst);
        error!(
            "Worker '{}' cannot be force-terminated in-process; marked aborted (was {})",
            self.name,
            WorkerStatus::from_code(prev).map_or_else(|| "?".to_string(), |s| s.to_string())
        );
        false
    }

    /// Cancel, then start a fresh run in the same execution form
    pub fn restart(self: &Arc<Self>, timeout: Option<Duration>) -> Result<()> {
        info!("Restarting worker '{}'", self.name);
        if !self.cancel(timeout) {
            return Err(CoreError::Timeout(
                timeout
                    .or(self.timeouts.restart_timeout())
                    .unwrap_or(DEFAULT_CANCEL_TIMEOUT),
            ));
        }
        if !self.request() {
            return Err(CoreError::InvalidState(format!(
                "worker '{}' is {} after cancel",
                self.name,
                self.status()
            )));
        }
        let mode = self.exec_mode.lock().clone().unwrap_or(ExecMode::Thread);
        self.spawn(mode)
    }

    /// Clear an `Aborted` status so the worker can be started again
    pub fn reset(&self) -> bool {
        self.cas_status(WorkerStatus::Aborted, WorkerStatus::Available)
    }

    /// Age of the last heartbeat
    pub fn heartbeat_age(&self) -> Duration {
        self.heartbeat.read().elapsed()
    }

    /// Whether the last run failed with an unclassified error or panic
    pub fn error_flag(&self) -> bool {
        self.error_flag.load(Ordering::SeqCst)
    }

    /// Clear the error flag (done by the watchdog after a restart)
    pub fn clear_error_flag(&self) {
        self.error_flag.store(false, Ordering::SeqCst);
    }

    /// Whether staleness checks are currently suspended
    pub fn checks_paused(&self) -> bool {
        self.pause_depth.load(Ordering::SeqCst) > 0
    }

    /// Snapshot of the composed stop signal for the current run
    pub fn stop_signal(&self) -> StopSignal {
        StopSignal {
            exit: self.exit.clone(),
            run: self.run_token.read().clone(),
            caller: self.caller_token.clone(),
        }
    }

    /// Whether any layer of the composed signal requests a stop
    pub fn stop_requested(&self) -> bool {
        self.stop_signal().is_stopped()
    }

    /// The host-wide exit token this worker shares
    pub fn exit_token(&self) -> &CancelToken {
        &self.exit
    }

    /// This worker's timeout tunables
    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }
}

impl Liveness for Worker {
    fn set_active(&self) -> Result<()> {
        *self.heartbeat.write() = Instant::now();

        if self.stop_requested() {
            return Err(CoreError::Cancelled);
        }
        if let Some(limit) = self.timeouts.run_timeout() {
            if let Some(started) = *self.run_started.read() {
                if started.elapsed() > limit {
                    return Err(CoreError::Timeout(limit));
                }
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

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn wait_for_status(worker: &Worker, wanted: WorkerStatus, within: Duration) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if worker.status() == wanted {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        worker.status() == wanted
    }

    /// Body that beats every few milliseconds until cancelled
    fn beating_body() -> WorkFn {
        Arc::new(|w: &Worker| {
            loop {
                w.set_active()?;
                thread::sleep(Duration::from_millis(5));
            }
        })
    }

    #[test]
    fn request_has_exactly_one_winner() {
        let worker = Worker::new(WorkerConfig::new("races"), Arc::new(|_: &Worker| Ok(())));

        let wins = Arc::new(AtomicU32::new(0));
        let mut handles = vec![];
        for _ in 0..8 {
            let worker = Arc::clone(&worker);
            let wins = Arc::clone(&wins);
            handles.push(thread::spawn(move || {
                if worker.request() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(worker.status(), WorkerStatus::Requested);
    }

    #[test]
    fn completed_body_returns_to_available() {
        let worker = Worker::new(WorkerConfig::new("oneshot"), Arc::new(|_: &Worker| Ok(())));
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Available,
            Duration::from_secs(2)
        ));
        assert!(!worker.error_flag());
    }

    #[test]
    fn unclassified_error_flags_but_releases() {
        let worker = Worker::new(
            WorkerConfig::new("failing"),
            Arc::new(|_: &Worker| Err("sensor read failed".into())),
        );
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Available,
            Duration::from_secs(2)
        ));
        assert!(worker.error_flag());
    }

    #[test]
    fn panicking_body_flags_but_releases() {
        let worker = Worker::new(
            WorkerConfig::new("panicking"),
            Arc::new(|_: &Worker| panic!("boom")),
        );
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Available,
            Duration::from_secs(2)
        ));
        assert!(worker.error_flag());
    }

    #[test]
    fn resource_exhaustion_raises_host_exit() {
        let config = WorkerConfig::new("oom");
        let exit = config.exit.clone();
        let worker = Worker::new(
            config,
            Arc::new(|_: &Worker| {
                Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::OutOfMemory,
                    "mmap failed",
                )))
            }),
        );
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Available,
            Duration::from_secs(2)
        ));
        assert!(exit.is_cancelled());
        assert!(!worker.error_flag());
    }

    #[test]
    fn cancel_on_never_started_worker_is_immediate() {
        let worker = Worker::new(WorkerConfig::new("idle"), beating_body());
        let started = Instant::now();
        assert!(worker.cancel(Some(Duration::from_secs(10))));
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn cooperative_cancel_completes_within_bound() {
        let worker = Worker::new(WorkerConfig::new("beating"), beating_body());
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Running,
            Duration::from_secs(2)
        ));

        thread::sleep(Duration::from_millis(50));
        assert!(worker.cancel(Some(Duration::from_millis(2000))));
        assert_eq!(worker.status(), WorkerStatus::Available);
        assert!(!worker.error_flag());

        // no further heartbeats after the body yielded
        thread::sleep(Duration::from_millis(60));
        assert!(worker.heartbeat_age() >= Duration::from_millis(50));
    }

    #[test]
    fn cancel_of_ignoring_body_times_out_and_state_stays_cancelling() {
        let worker = Worker::new(
            WorkerConfig::new("deaf"),
            Arc::new(|_: &Worker| {
                // ignores cancellation for 300ms, then yields
                thread::sleep(Duration::from_millis(300));
                Ok(())
            }),
        );
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Running,
            Duration::from_secs(2)
        ));

        assert!(!worker.cancel(Some(Duration::from_millis(50))));
        assert_eq!(worker.status(), WorkerStatus::Cancelling);

        // once the body eventually yields, the cancel completes
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Available,
            Duration::from_secs(2)
        ));
    }

    #[test]
    fn second_cancel_joins_the_first() {
        let worker = Worker::new(
            WorkerConfig::new("slow-yield"),
            Arc::new(|_: &Worker| {
                thread::sleep(Duration::from_millis(150));
                Ok(())
            }),
        );
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Running,
            Duration::from_secs(2)
        ));

        let joiner = {
            let worker = Arc::clone(&worker);
            thread::spawn(move || worker.cancel(Some(Duration::from_secs(2))))
        };
        // both the initiating and the joining cancel report completion
        assert!(worker.cancel(Some(Duration::from_secs(2))));
        assert!(joiner.join().unwrap());
        assert_eq!(worker.status(), WorkerStatus::Available);
    }

    #[test]
    fn run_timeout_unwinds_the_body() {
        let mut config = WorkerConfig::new("expiring");
        config.timeouts.run_timeout_ms = Some(40);
        let worker = Worker::new(config, beating_body());
        worker.start_thread().unwrap();

        assert!(wait_for_status(
            &worker,
            WorkerStatus::Available,
            Duration::from_secs(2)
        ));
        // a run timeout classifies as a plain retry, not a fault
        assert!(!worker.error_flag());
    }

    #[test]
    fn run_direct_requires_available() {
        let worker = Worker::new(WorkerConfig::new("direct"), beating_body());
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Running,
            Duration::from_secs(2)
        ));

        match worker.run_direct() {
            Err(CoreError::InvalidState(_)) => {}
            other => panic!("expected InvalidState, got {other:?}"),
        }
        assert!(worker.cancel(Some(Duration::from_secs(2))));

        // available again: direct run executes on this thread
        let direct = Worker::new(WorkerConfig::new("direct2"), Arc::new(|_: &Worker| Ok(())));
        direct.run_direct().unwrap();
        assert_eq!(direct.status(), WorkerStatus::Available);
    }

    #[test]
    fn restart_runs_the_body_again() {
        let runs = Arc::new(AtomicU32::new(0));
        let body_runs = Arc::clone(&runs);
        let worker = Worker::new(
            WorkerConfig::new("restarting"),
            Arc::new(move |w: &Worker| {
                body_runs.fetch_add(1, Ordering::SeqCst);
                loop {
                    w.set_active()?;
                    thread::sleep(Duration::from_millis(5));
                }
            }),
        );
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Running,
            Duration::from_secs(2)
        ));

        worker.restart(Some(Duration::from_secs(2))).unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Running,
            Duration::from_secs(2)
        ));
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        assert!(worker.cancel(Some(Duration::from_secs(2))));
    }

    #[test]
    fn abort_flips_to_aborted_and_reset_recovers() {
        let mut config = WorkerConfig::new("stuck");
        config.timeouts.restart_timeout_ms = Some(50);
        let worker = Worker::new(
            config,
            Arc::new(|_: &Worker| {
                thread::sleep(Duration::from_millis(250));
                Ok(())
            }),
        );
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Running,
            Duration::from_secs(2)
        ));

        // cancel cannot win within 50ms, so abort reports failure
        assert!(!worker.abort(true));
        assert_eq!(worker.status(), WorkerStatus::Aborted);
        assert!(!worker.request());
        assert!(worker.start_thread().is_err());

        // the body finishing does not resurrect an aborted worker
        thread::sleep(Duration::from_millis(300));
        assert_eq!(worker.status(), WorkerStatus::Aborted);

        assert!(worker.reset());
        assert_eq!(worker.status(), WorkerStatus::Available);
        assert!(worker.request());
    }

    #[test]
    fn caller_token_is_part_of_the_composition() {
        let caller = CancelToken::new();
        let mut config = WorkerConfig::new("caller-cancel");
        config.caller_token = Some(caller.clone());
        let worker = Worker::new(config, beating_body());
        worker.start_thread().unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Running,
            Duration::from_secs(2)
        ));

        caller.cancel();
        // the body unwinds through Cancelled and completion runs
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Available,
            Duration::from_secs(2)
        ));
        assert!(!worker.error_flag());
    }

    #[test]
    fn pooled_start_requires_request_and_runs() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .build()
            .unwrap();
        let worker = Worker::new(WorkerConfig::new("pooled"), beating_body());

        // without the explicit request, a pooled start is rejected
        assert!(worker.start_pooled(runtime.handle()).is_err());

        assert!(worker.request());
        worker.start_pooled(runtime.handle()).unwrap();
        assert!(wait_for_status(
            &worker,
            WorkerStatus::Running,
            Duration::from_secs(2)
        ));

        assert!(worker.cancel(Some(Duration::from_secs(2))));
    }

    #[test]
    fn pause_depth_nests() {
        let worker = Worker::new(WorkerConfig::new("paused"), beating_body());
        assert!(!worker.checks_paused());
        worker.pause_checks();
        worker.pause_checks();
        worker.resume_checks();
        assert!(worker.checks_paused());
        worker.resume_checks();
        assert!(!worker.checks_paused());
        // extra resumes do not underflow
        worker.resume_checks();
        assert!(!worker.checks_paused());
    }
}
