//! Process adapters for abstracting OS process management
//!
//! Two seams: [`ProcessControl`] abstracts the raw signal/aliveness
//! operations the graded kill ladder is built on, and [`ProcessAdapter`]
//! abstracts the whole find/start/kill surface the watchdog drives. Both
//! ship mock implementations so supervision logic is testable without
//! touching real processes.

use crate::Result;
use parking_lot::Mutex;
use schema::ProcessSpec;
use std::collections::HashSet;
use std::time::Instant;
use tracing::debug;

/// Raw per-pid operations the kill ladder escalates through
pub trait ProcessControl: Send + Sync {
    /// Ask the process to shut down gracefully (SIGTERM on Unix)
    fn request_close(&self, pid: u32) -> Result<()>;

    /// Terminate the process without cleanup (SIGKILL on Unix)
    fn kill(&self, pid: u32) -> Result<()>;

    /// Whether the process still exists
    fn is_alive(&self, pid: u32) -> bool;
}

/// Unix implementation over `nix` signals
#[cfg(unix)]
#[derive(Copy, Clone, Debug, Default)]
pub struct UnixProcessControl;

#[cfg(unix)]
impl ProcessControl for UnixProcessControl {
    fn request_close(&self, pid: u32) -> Result<()> {
        super::unix::signal_term(pid)
    }

    fn kill(&self, pid: u32) -> Result<()> {
        super::unix::signal_kill(pid)
    }

    fn is_alive(&self, pid: u32) -> bool {
        super::unix::is_process_alive(pid)
    }
}

/// The find/start/kill surface the watchdog drives for each descriptor
pub trait ProcessAdapter: Send + Sync {
    /// Enumerate pids currently running under the spec's derived name
    fn find_instances(&self, spec: &ProcessSpec) -> Result<Vec<u32>>;

    /// Stage and start one new instance; returns its pid
    fn start(&self, spec: &ProcessSpec) -> Result<u32>;

    /// Graded shutdown of one pid
    fn kill_process(&self, pid: u32) -> Result<()>;
}

/// What a [`MockProcessControl`] saw, with the time it saw it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    /// `request_close` was called
    RequestClose,
    /// `kill` was called
    Kill,
}

/// One recorded mock-control call
#[derive(Debug, Clone, Copy)]
pub struct ControlEvent {
    /// When the call happened
    pub at: Instant,
    /// Which operation it was
    pub action: ControlAction,
    /// The target pid
    pub pid: u32,
}

#[derive(Debug, Default)]
struct MockControlState {
    alive: HashSet<u32>,
    dies_on_close: HashSet<u32>,
    dies_on_kill: HashSet<u32>,
    events: Vec<ControlEvent>,
}

/// Mock process control recording every call with a timestamp
///
/// Processes are scripted per pid: whether they exit on the graceful close
/// request, on the hard kill, or never (an immortal process exercises the
/// ladder's failure report).
#[derive(Debug, Default)]
pub struct MockProcessControl {
    state: Mutex<MockControlState>,
}

impl MockProcessControl {
    /// Create an empty mock with no live processes
    pub fn new() -> Self {
        Self::default()
    }

    /// Script one live process: `dies_on_close`/`dies_on_kill` control which
    /// ladder stage (if any) makes it exit
    pub fn add_process(&self, pid: u32, dies_on_close: bool, dies_on_kill: bool) {
        let mut state = self.state.lock();
        state.alive.insert(pid);
        if dies_on_close {
            state.dies_on_close.insert(pid);
        }
        if dies_on_kill {
            state.dies_on_kill.insert(pid);
        }
    }

    /// Every call recorded so far, in order
    pub fn events(&self) -> Vec<ControlEvent> {
        self.state.lock().events.clone()
    }
}

impl ProcessControl for MockProcessControl {
    fn request_close(&self, pid: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.events.push(ControlEvent {
            at: Instant::now(),
            action: ControlAction::RequestClose,
            pid,
        });
        if state.dies_on_close.contains(&pid) {
            state.alive.remove(&pid);
        }
        Ok(())
    }

    fn kill(&self, pid: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.events.push(ControlEvent {
            at: Instant::now(),
            action: ControlAction::Kill,
            pid,
        });
        if state.dies_on_kill.contains(&pid) {
            state.alive.remove(&pid);
        }
        Ok(())
    }

    fn is_alive(&self, pid: u32) -> bool {
        self.state.lock().alive.contains(&pid)
    }
}

/// One recorded mock-adapter call
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// `start` was called for the named instance
    Start {
        /// Derived instance name
        instance: String,
        /// When the call happened
        at: Instant,
    },
    /// `kill_process` was called
    Kill {
        /// The target pid
        pid: u32,
        /// When the call happened
        at: Instant,
    },
}

#[derive(Debug, Default)]
struct MockAdapterState {
    find_results: Vec<Vec<u32>>,
    kill_fails: HashSet<u32>,
    events: Vec<AdapterEvent>,
    next_pid: u32,
}

/// Mock process adapter for watchdog tests
///
/// `find_instances` pops scripted results (the last one repeats once the
/// script is exhausted; an empty script means "nothing running"). Starts
/// and kills are recorded with timestamps.
#[derive(Debug, Default)]
pub struct MockProcessAdapter {
    state: Mutex<MockAdapterState>,
}

impl MockProcessAdapter {
    /// Create a mock that finds nothing and starts pids from 1000 up
    pub fn new() -> Self {
        let mock = Self::default();
        mock.state.lock().next_pid = 1000;
        mock
    }

    /// Queue the pid list the next `find_instances` call returns
    pub fn push_find_result(&self, pids: Vec<u32>) {
        self.state.lock().find_results.push(pids);
    }

    /// Make `kill_process(pid)` fail
    pub fn fail_kill_of(&self, pid: u32) {
        self.state.lock().kill_fails.insert(pid);
    }

    /// Every call recorded so far, in order
    pub fn events(&self) -> Vec<AdapterEvent> {
        self.state.lock().events.clone()
    }

    /// Recorded start calls only
    pub fn starts(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AdapterEvent::Start { instance, .. } => Some(instance),
                AdapterEvent::Kill { .. } => None,
            })
            .collect()
    }

    /// Recorded kill calls only
    pub fn kills(&self) -> Vec<u32> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AdapterEvent::Kill { pid, .. } => Some(pid),
                AdapterEvent::Start { .. } => None,
            })
            .collect()
    }
}

impl ProcessAdapter for MockProcessAdapter {
    fn find_instances(&self, spec: &ProcessSpec) -> Result<Vec<u32>> {
        let mut state = self.state.lock();
        let result = if state.find_results.len() > 1 {
            state.find_results.remove(0)
        } else {
            state.find_results.first().cloned().unwrap_or_default()
        };
        debug!(
            "Mock find_instances for '{}': {:?}",
            spec.instance_name(),
            result
        );
        Ok(result)
    }

    fn start(&self, spec: &ProcessSpec) -> Result<u32> {
        let mut state = self.state.lock();
        state.events.push(AdapterEvent::Start {
            instance: spec.instance_name(),
            at: Instant::now(),
        });
        state.next_pid += 1;
        Ok(state.next_pid)
    }

    fn kill_process(&self, pid: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.events.push(AdapterEvent::Kill {
            pid,
            at: Instant::now(),
        });
        if state.kill_fails.contains(&pid) {
            return Err(crate::CoreError::ProcessWait(format!(
                "mock pid {pid} refused to die"
            )));
        }
        Ok(())
    }
}
