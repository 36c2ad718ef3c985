//! The supervisory loop
//!
//! The watchdog runs on its own dedicated thread at a configured frequency
//! and, each cycle: judges every registered worker's liveness from its
//! heartbeat age and error flag, judges every registered external process
//! from its OS presence and stamp-file age, and runs the pluggable
//! additional checks. Recovery escalates from restarts to a whole-host
//! exit. A failure while checking one entry is caught and logged; it never
//! halts supervision of the others.

use crate::cancel::CancelToken;
use crate::config::WatchdogSettings;
use crate::host::HostExit;
use crate::process::adapter::ProcessAdapter;
use crate::stamp::StampFile;
use crate::worker::Worker;
use crate::{CoreError, Result};
use parking_lot::Mutex;
use schema::ProcessSpec;
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info, warn};

/// A pluggable additional health check
///
/// `Ok(false)` means the checked condition failed and the host must stop;
/// `Err` means the check itself could not run, which is logged but does not
/// escalate.
pub trait HealthCheck: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Run the check
    fn check(&self) -> Result<bool>;
}

/// The supervisory loop over workers, external processes, and extra checks
pub struct Watchdog {
    settings: WatchdogSettings,
    exit: CancelToken,
    host: Arc<dyn HostExit>,
    adapter: Arc<dyn ProcessAdapter>,
    workers: Mutex<Vec<Arc<Worker>>>,
    processes: Mutex<Vec<ProcessSpec>>,
    checks: Mutex<Vec<Arc<dyn HealthCheck>>>,
    stop: CancelToken,
}

impl Watchdog {
    /// Create a watchdog
    ///
    /// `exit` is the host-wide exit token shared with every worker; `host`
    /// performs the forced exit when escalation runs out of options;
    /// `adapter` carries the OS process operations (a
    /// [`crate::process::ProcessLauncher`] in production).
    pub fn new(
        settings: WatchdogSettings,
        exit: CancelToken,
        adapter: Arc<dyn ProcessAdapter>,
        host: Arc<dyn HostExit>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            exit,
            host,
            adapter,
            workers: Mutex::new(Vec::new()),
            processes: Mutex::new(Vec::new()),
            checks: Mutex::new(Vec::new()),
            stop: CancelToken::new(),
        })
    }

    /// Register a worker for supervision; the watchdog observes it but
    /// never owns it
    pub fn register_worker(&self, worker: Arc<Worker>) {
        info!("Watchdog now supervising worker '{}'", worker.name());
        self.workers.lock().push(worker);
    }

    /// Register an external process instance for supervision
    pub fn register_process(&self, spec: ProcessSpec) {
        info!("Watchdog now supervising process '{}'", spec.instance_name());
        self.processes.lock().push(spec);
    }

    /// Register an additional health check
    pub fn register_check(&self, check: Arc<dyn HealthCheck>) {
        info!("Watchdog now running check '{}'", check.name());
        self.checks.lock().push(check);
    }

    /// Start the supervisory thread
    pub fn start(self: &Arc<Self>) -> Result<thread::JoinHandle<()>> {
        let watchdog = Arc::clone(self);
        thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || {
                info!(
                    "Watchdog running every {:?}",
                    watchdog.settings.frequency()
                );
                while !watchdog.stop.is_cancelled() {
                    watchdog.run_cycle();
                    thread::sleep(watchdog.settings.frequency());
                }
                info!("Watchdog stopped");
            })
            .map_err(|e| CoreError::Other(format!("watchdog spawn failed: {e}")))
    }

    /// Stop the supervisory thread after its current cycle
    pub fn stop(&self) {
        self.stop.cancel();
    }

    /// One supervision pass; public so hosts and tests can drive cycles
    /// explicitly
    pub fn run_cycle(&self) {
        let workers = self.workers.lock().clone();
        for worker in &workers {
            if self.exit.is_cancelled() {
                error!("Host exit requested; escalating");
                self.exit_host();
                return;
            }
            self.check_worker(worker);
        }

        let processes = self.processes.lock().clone();
        for spec in &processes {
            if let Err(e) = self.check_process(spec) {
                error!(
                    "Check of process '{}' failed: {e}; continuing with the rest",
                    spec.instance_name()
                );
            }
        }

        let checks = self.checks.lock().clone();
        for check in &checks {
            match check.check() {
                Ok(true) => debug!("Check '{}' passed", check.name()),
                Ok(false) => {
                    error!("Check '{}' failed; escalating", check.name());
                    self.exit_host();
                }
                Err(e) => {
                    error!(
                        "Check '{}' could not run: {e}; continuing with the rest",
                        check.name()
                    );
                }
            }
        }
    }

    fn check_worker(&self, worker: &Arc<Worker>) {
        if worker.checks_paused() {
            debug!("Worker '{}' has checking paused; skipped", worker.name());
            return;
        }

        let threshold = worker
            .timeouts()
            .not_responding()
            .unwrap_or_else(|| self.settings.not_responding());
        let age = worker.heartbeat_age();
        let stalled = age > threshold;

        if !stalled && !worker.error_flag() {
            debug!("Worker '{}' heartbeat age {age:?}", worker.name());
            return;
        }

        if stalled {
            warn!(
                "Worker '{}' heartbeat is {age:?} old (threshold {threshold:?}); restarting",
                worker.name()
            );
        } else {
            warn!("Worker '{}' has its error flag set; restarting", worker.name());
        }

        let restart_bound = worker
            .timeouts()
            .restart_timeout()
            .unwrap_or_else(|| self.settings.restart_timeout());
        match worker.restart(Some(restart_bound)) {
            Ok(()) => {
                worker.clear_error_flag();
                info!("Worker '{}' restarted", worker.name());
            }
            Err(e) => {
                error!(
                    "Restart of worker '{}' failed: {e}; escalating",
                    worker.name()
                );
                self.exit_host();
            }
        }
    }

    fn check_process(&self, spec: &ProcessSpec) -> Result<()> {
        let name = spec.instance_name();
        let pids = self.adapter.find_instances(spec)?;

        match pids.len() {
            0 => {
                info!("No instance of '{name}' running; starting one");
                self.adapter.start(spec)?;
            }
            1 => self.check_stamp(spec, pids[0])?,
            n => {
                warn!("{n} duplicate instances of '{name}'; killing all");
                let mut all_killed = true;
                for pid in &pids {
                    if let Err(e) = self.adapter.kill_process(*pid) {
                        error!("Kill of duplicate '{name}' (pid {pid}) failed: {e}");
                        all_killed = false;
                    }
                }
                if all_killed {
                    thread::sleep(spec.restart_delay_or(self.settings.restart_delay()));
                    self.adapter.start(spec)?;
                } else {
                    warn!("Leaving '{name}' alone until the duplicates are gone");
                }
            }
        }
        Ok(())
    }

    fn check_stamp(&self, spec: &ProcessSpec, pid: u32) -> Result<()> {
        if !spec.use_stamp_file {
            return Ok(());
        }

        let stamp = StampFile::new(self.settings.stamp_dir.join(spec.stamp_file_name()));
        let threshold = spec.not_responding_or(self.settings.not_responding());

        match stamp.age() {
            Ok(age) if age > threshold => {
                warn!(
                    "Instance '{}' (pid {pid}) stamp is {age:?} old (threshold {threshold:?}); restarting",
                    spec.instance_name()
                );
                self.adapter.kill_process(pid)?;
                thread::sleep(spec.restart_delay_or(self.settings.restart_delay()));
                self.adapter.start(spec)?;
            }
            Ok(age) => {
                debug!("Instance '{}' stamp age {age:?}", spec.instance_name());
            }
            Err(CoreError::IoError(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(
                    "Stamp file {} missing for running instance '{}' (pid {pid})",
                    stamp.path().display(),
                    spec.instance_name()
                );
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    /// Exit escalation: raise the host-wide exit token, give the host the
    /// configured grace period for a clean shutdown, then force the exit
    fn exit_host(&self) {
        self.exit.cancel();
        warn!(
            "Host exit requested; waiting {:?} for a clean shutdown",
            self.settings.exit_grace()
        );
        thread::sleep(self.settings.exit_grace());
        self.host.force_exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MockHostExit;
    use crate::liveness::Liveness;
    use crate::process::adapter::{AdapterEvent, MockProcessAdapter};
    use crate::worker::{WorkFn, WorkerConfig};
    use schema::{TimeoutPolicy, WorkerStatus};
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, Instant};

    fn test_settings(stamp_dir: &Path) -> WatchdogSettings {
        WatchdogSettings {
            frequency_ms: 20,
            not_responding_ms: 60,
            restart_timeout_ms: 2_000,
            restart_delay_ms: 30,
            exit_grace_ms: 10,
            stamp_dir: stamp_dir.to_path_buf(),
        }
    }

    struct Fixture {
        watchdog: Arc<Watchdog>,
        adapter: Arc<MockProcessAdapter>,
        host: Arc<MockHostExit>,
        exit: CancelToken,
        _stamp_dir: tempfile::TempDir,
        stamp_dir: std::path::PathBuf,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let stamp_dir = dir.path().to_path_buf();
        let adapter = Arc::new(MockProcessAdapter::new());
        let host = Arc::new(MockHostExit::new());
        let exit = CancelToken::new();
        let watchdog = Watchdog::new(
            test_settings(&stamp_dir),
            exit.clone(),
            Arc::clone(&adapter) as Arc<dyn ProcessAdapter>,
            Arc::clone(&host) as Arc<dyn HostExit>,
        );
        Fixture {
            watchdog,
            adapter,
            host,
            exit,
            _stamp_dir: dir,
            stamp_dir,
        }
    }

    fn process_spec(stamp_dir: &Path) -> ProcessSpec {
        ProcessSpec {
            program: "collector".to_string(),
            suffix: "a".to_string(),
            args: vec![],
            parent_pid: 0,
            use_stamp_file: true,
            source_dir: stamp_dir.join("source"),
            work_dir: stamp_dir.join("work"),
            staged_files: vec![],
            timeouts: TimeoutPolicy::default(),
        }
    }

    /// Body that beats once, then waits for its stop signal
    fn beat_once_body(runs: Arc<AtomicU32>) -> WorkFn {
        Arc::new(move |w: &crate::worker::Worker| {
            runs.fetch_add(1, Ordering::SeqCst);
            w.set_active()?;
            while !w.stop_requested() {
                thread::sleep(Duration::from_millis(5));
            }
            Err(CoreError::Cancelled.into())
        })
    }

    /// Body that beats continuously
    fn beating_body() -> WorkFn {
        Arc::new(|w: &crate::worker::Worker| loop {
            w.set_active()?;
            thread::sleep(Duration::from_millis(5));
        })
    }

    fn wait_for_status(
        worker: &crate::worker::Worker,
        wanted: WorkerStatus,
        within: Duration,
    ) -> bool {
        let deadline = Instant::now() + within;
        while Instant::now() < deadline {
            if worker.status() == wanted {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        worker.status() == wanted
    }

    #[test]
    fn fresh_worker_is_left_alone() {
        let f = fixture();
        let mut config = WorkerConfig::new("fresh");
        config.exit = f.exit.clone();
        let worker = Worker::new(config, beating_body());
        worker.start_thread().unwrap();
        assert!(wait_for_status(&worker, WorkerStatus::Running, Duration::from_secs(2)));
        f.watchdog.register_worker(Arc::clone(&worker));

        f.watchdog.run_cycle();

        assert_eq!(worker.status(), WorkerStatus::Running);
        assert!(!f.host.exited());
        assert!(worker.cancel(Some(Duration::from_secs(2))));
    }

    #[test]
    fn stalled_worker_is_restarted() {
        let f = fixture();
        let runs = Arc::new(AtomicU32::new(0));
        let mut config = WorkerConfig::new("stalled");
        config.exit = f.exit.clone();
        let worker = Worker::new(config, beat_once_body(Arc::clone(&runs)));
        worker.start_thread().unwrap();
        assert!(wait_for_status(&worker, WorkerStatus::Running, Duration::from_secs(2)));
        f.watchdog.register_worker(Arc::clone(&worker));

        // let the single heartbeat go stale past the 60ms threshold
        thread::sleep(Duration::from_millis(120));
        f.watchdog.run_cycle();

        assert!(wait_for_status(&worker, WorkerStatus::Running, Duration::from_secs(2)));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(!f.host.exited());
        assert!(worker.cancel(Some(Duration::from_secs(2))));
    }

    #[test]
    fn paused_worker_is_skipped() {
        let f = fixture();
        let runs = Arc::new(AtomicU32::new(0));
        let mut config = WorkerConfig::new("paused");
        config.exit = f.exit.clone();
        let worker = Worker::new(config, beat_once_body(Arc::clone(&runs)));
        worker.start_thread().unwrap();
        assert!(wait_for_status(&worker, WorkerStatus::Running, Duration::from_secs(2)));
        f.watchdog.register_worker(Arc::clone(&worker));

        worker.pause_checks();
        thread::sleep(Duration::from_millis(120));
        f.watchdog.run_cycle();

        assert_eq!(runs.load(Ordering::SeqCst), 1, "paused worker must not restart");
        worker.resume_checks();
        assert!(worker.cancel(Some(Duration::from_secs(2))));
    }

    #[test]
    fn error_flagged_worker_is_restarted_and_flag_cleared() {
        let f = fixture();
        let runs = Arc::new(AtomicU32::new(0));
        let body_runs = Arc::clone(&runs);
        let mut config = WorkerConfig::new("flagged");
        config.exit = f.exit.clone();
        let worker = Worker::new(
            config,
            Arc::new(move |w: &crate::worker::Worker| {
                let run = body_runs.fetch_add(1, Ordering::SeqCst);
                if run == 0 {
                    return Err("first run fails".into());
                }
                loop {
                    w.set_active()?;
                    thread::sleep(Duration::from_millis(5));
                }
            }),
        );
        worker.start_thread().unwrap();
        assert!(wait_for_status(&worker, WorkerStatus::Available, Duration::from_secs(2)));
        assert!(worker.error_flag());
        f.watchdog.register_worker(Arc::clone(&worker));

        f.watchdog.run_cycle();

        assert!(wait_for_status(&worker, WorkerStatus::Running, Duration::from_secs(2)));
        assert!(!worker.error_flag());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(worker.cancel(Some(Duration::from_secs(2))));
    }

    #[test]
    fn exit_token_triggers_forced_exit() {
        let f = fixture();
        let worker = Worker::new(WorkerConfig::new("bystander"), beating_body());
        f.watchdog.register_worker(worker);

        f.exit.cancel();
        f.watchdog.run_cycle();

        assert_eq!(f.host.calls(), vec![1]);
    }

    #[test]
    fn missing_process_is_started_exactly_once() {
        let f = fixture();
        f.watchdog.register_process(process_spec(&f.stamp_dir));

        f.watchdog.run_cycle();

        assert_eq!(f.adapter.starts(), vec!["collector_a".to_string()]);
        assert!(f.adapter.kills().is_empty());
    }

    #[test]
    fn duplicate_processes_are_killed_then_one_started_after_delay() {
        let f = fixture();
        f.watchdog.register_process(process_spec(&f.stamp_dir));
        f.adapter.push_find_result(vec![11, 12]);

        f.watchdog.run_cycle();

        assert_eq!(f.adapter.kills(), vec![11, 12]);
        assert_eq!(f.adapter.starts().len(), 1);

        // the replacement start happens only after the restart delay
        let events = f.adapter.events();
        let last_kill = events
            .iter()
            .filter_map(|e| match e {
                AdapterEvent::Kill { at, .. } => Some(*at),
                AdapterEvent::Start { .. } => None,
            })
            .last()
            .unwrap();
        let start = events
            .iter()
            .filter_map(|e| match e {
                AdapterEvent::Start { at, .. } => Some(*at),
                AdapterEvent::Kill { .. } => None,
            })
            .last()
            .unwrap();
        assert!(start.duration_since(last_kill) >= Duration::from_millis(30));
    }

    #[test]
    fn failed_duplicate_kill_suppresses_the_restart() {
        let f = fixture();
        f.watchdog.register_process(process_spec(&f.stamp_dir));
        f.adapter.push_find_result(vec![11, 12]);
        f.adapter.fail_kill_of(12);

        f.watchdog.run_cycle();

        assert_eq!(f.adapter.kills(), vec![11, 12]);
        assert!(f.adapter.starts().is_empty());
    }

    #[test]
    fn stale_stamp_restarts_the_process() {
        let f = fixture();
        let spec = process_spec(&f.stamp_dir);
        let stamp = StampFile::new(f.stamp_dir.join(spec.stamp_file_name()));
        stamp.touch().unwrap();
        let past = filetime::FileTime::from_system_time(
            std::time::SystemTime::now() - Duration::from_secs(10),
        );
        filetime::set_file_mtime(stamp.path(), past).unwrap();

        f.watchdog.register_process(spec);
        f.adapter.push_find_result(vec![42]);

        f.watchdog.run_cycle();

        assert_eq!(f.adapter.kills(), vec![42]);
        assert_eq!(f.adapter.starts().len(), 1);
    }

    #[test]
    fn fresh_stamp_leaves_the_process_alone() {
        let f = fixture();
        let spec = process_spec(&f.stamp_dir);
        StampFile::new(f.stamp_dir.join(spec.stamp_file_name()))
            .touch()
            .unwrap();

        f.watchdog.register_process(spec);
        f.adapter.push_find_result(vec![42]);

        f.watchdog.run_cycle();

        assert!(f.adapter.kills().is_empty());
        assert!(f.adapter.starts().is_empty());
    }

    #[test]
    fn missing_stamp_is_logged_but_not_fatal() {
        let f = fixture();
        f.watchdog.register_process(process_spec(&f.stamp_dir));
        f.adapter.push_find_result(vec![42]);

        f.watchdog.run_cycle();

        assert!(f.adapter.kills().is_empty());
        assert!(f.adapter.starts().is_empty());
        assert!(!f.host.exited());
    }

    struct ScriptedCheck {
        name: &'static str,
        result: fn() -> Result<bool>,
    }

    impl HealthCheck for ScriptedCheck {
        fn name(&self) -> &str {
            self.name
        }

        fn check(&self) -> Result<bool> {
            (self.result)()
        }
    }

    #[test]
    fn failing_check_escalates() {
        let f = fixture();
        f.watchdog.register_check(Arc::new(ScriptedCheck {
            name: "disk-space",
            result: || Ok(false),
        }));

        f.watchdog.run_cycle();

        assert!(f.exit.is_cancelled());
        assert_eq!(f.host.calls(), vec![1]);
    }

    #[test]
    fn erroring_check_is_logged_not_escalated() {
        let f = fixture();
        f.watchdog.register_check(Arc::new(ScriptedCheck {
            name: "flaky",
            result: || Err(CoreError::Other("probe unavailable".to_string())),
        }));

        f.watchdog.run_cycle();

        assert!(!f.exit.is_cancelled());
        assert!(!f.host.exited());
    }

    #[test]
    fn one_bad_process_does_not_halt_the_cycle() {
        let f = fixture();
        // first spec's find succeeds with a duplicate kill that fails;
        // second spec must still be checked and started
        let mut first = process_spec(&f.stamp_dir);
        first.suffix = "bad".to_string();
        let mut second = process_spec(&f.stamp_dir);
        second.suffix = "good".to_string();

        f.watchdog.register_process(first);
        f.watchdog.register_process(second);
        f.adapter.push_find_result(vec![7, 8]);
        f.adapter.push_find_result(vec![]);
        f.adapter.fail_kill_of(7);

        f.watchdog.run_cycle();

        assert_eq!(f.adapter.starts(), vec!["collector_good".to_string()]);
    }
}
