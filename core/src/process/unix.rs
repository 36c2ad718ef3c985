//! Unix process primitives: detached spawn, signals, aliveness, enumeration
//!
//! Spawned processes are placed in their own session via `setsid()` so they
//! survive the host and do not share its controlling terminal. Signals are
//! sent with `nix`; `ESRCH` (and `EPERM`, which on a supervised box means
//! the target already exited and its pid was reused by another user) are
//! treated as already-exited rather than as failures.

// Allow unsafe code for this module since detaching requires libc::setsid()
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, error};

/// Spawn `binary` with `args` as a detached process in its own session
///
/// Returns the child's pid. The child's stdio is nulled; log routing is the
/// child's own responsibility (it receives its staged log configuration).
pub fn spawn_detached(binary: &Path, args: &[String], cwd: &Path) -> Result<u32> {
    debug!("Spawning detached process: {} {:?}", binary.display(), args);

    let mut command = Command::new(binary);
    command
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // Safety: setsid() is async-signal-safe and appropriate for use in
    // pre_exec; it runs in the child between fork and exec.
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", binary.display(), e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", binary.display(), e))
    })?;

    let pid = child.id();
    debug!("Spawned process {} in new session", pid);
    Ok(pid)
}

/// Send SIGTERM to `pid`, asking it to shut down gracefully
pub fn signal_term(pid: u32) -> Result<()> {
    send_signal(pid, Signal::SIGTERM)
}

/// Send SIGKILL to `pid`, terminating it without cleanup
pub fn signal_kill(pid: u32) -> Result<()> {
    send_signal(pid, Signal::SIGKILL)
}

fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    let target = match i32::try_from(pid) {
        Ok(v) => Pid::from_raw(v),
        Err(_) => {
            return Err(CoreError::ProcessSignal(format!(
                "pid {pid} exceeds the platform pid range"
            )))
        }
    };

    match kill(target, signal) {
        Ok(()) => {
            debug!("Sent {signal} to process {pid}");
            Ok(())
        }
        Err(Errno::ESRCH) => {
            // Process already exited.
            debug!("Process {pid} already exited");
            Ok(())
        }
        Err(Errno::EPERM) => {
            debug!("Permission denied signaling {pid} (likely already exited)");
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {signal} to process {pid}: {e}");
            Err(CoreError::ProcessSignal(format!(
                "Failed to send {signal} to process {pid}: {e}"
            )))
        }
    }
}

/// Check whether a process with the given pid exists
///
/// Sends the null signal (signal 0). `EPERM` means the process exists but
/// belongs to someone else, so it still counts as alive. An exited direct
/// child is reaped first: a zombie still answers the null signal, which
/// would otherwise read as alive forever.
pub fn is_process_alive(pid: u32) -> bool {
    let target = match i32::try_from(pid) {
        Ok(v) => Pid::from_raw(v),
        Err(_) => return false,
    };

    match waitpid(target, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) => return true,
        // exited child, reaped just now
        Ok(_) => return false,
        // not our child; fall through to the signal probe
        Err(_) => {}
    }

    match kill(target, None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

/// Linux truncates the per-task command name to this many bytes.
const TASK_COMM_LEN: usize = 15;

/// Enumerate pids whose command name matches `name`
///
/// Scans `/proc/<pid>/comm`. The kernel truncates `comm` to 15 bytes, so the
/// comparison truncates `name` the same way.
pub fn find_by_name(name: &str) -> Result<Vec<u32>> {
    let wanted: &str = if name.len() > TASK_COMM_LEN {
        &name[..TASK_COMM_LEN]
    } else {
        name
    };

    let mut pids = Vec::new();
    for entry in std::fs::read_dir("/proc")? {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let pid: u32 = match entry.file_name().to_string_lossy().parse() {
            Ok(p) => p,
            Err(_) => continue, // not a pid directory
        };
        // The process may exit between readdir and the read; skip quietly.
        let comm = match std::fs::read_to_string(entry.path().join("comm")) {
            Ok(c) => c,
            Err(_) => continue,
        };
        if comm.trim_end() != wanted {
            continue;
        }
        // Zombies keep their /proc entry until reaped; they are not
        // instances. State is the first field after the parenthesized name.
        let stat = std::fs::read_to_string(entry.path().join("stat")).unwrap_or_default();
        let is_zombie = stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| rest.trim_start().starts_with('Z'));
        if !is_zombie {
            pids.push(pid);
        }
    }
    Ok(pids)
}
