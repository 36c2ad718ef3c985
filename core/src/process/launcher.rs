//! Launching supervised process instances and graded shutdown
//!
//! `Start` stages the program binary and its companion files into
//! instance-renamed copies (so several instances of the same program coexist
//! under distinct OS process names), removes any stale stamp file, and
//! spawns the staged binary with the supervision flags. `kill_process`
//! escalates: graceful close request, bounded wait, hard kill, bounded
//! wait, failure report.

use crate::process::adapter::{ProcessAdapter, ProcessControl};
use crate::stamp::StampFile;
use crate::{CoreError, Result};
use schema::ProcessSpec;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Stage waits for the graded kill ladder
///
/// Defaults match the shutdown contract: 5 s after the close request, 10 s
/// after the hard kill. Tests compress these.
#[derive(Debug, Clone, Copy)]
pub struct KillTimings {
    /// How long to wait for a graceful exit after the close request
    pub close_wait: Duration,
    /// How long to wait for the hard kill to take effect
    pub kill_wait: Duration,
    /// Aliveness poll interval during the waits
    pub poll_interval: Duration,
}

impl Default for KillTimings {
    fn default() -> Self {
        Self {
            close_wait: Duration::from_secs(5),
            kill_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Stages and starts external process instances, and shuts them down
pub struct ProcessLauncher {
    control: Arc<dyn ProcessControl>,
    timings: KillTimings,
    stamp_dir: PathBuf,
}

impl ProcessLauncher {
    /// Create a launcher using real OS process control
    #[cfg(unix)]
    pub fn new(stamp_dir: impl Into<PathBuf>) -> Self {
        Self::with_control(
            stamp_dir,
            Arc::new(super::adapter::UnixProcessControl),
            KillTimings::default(),
        )
    }

    /// Create a launcher with explicit control and timings (used by tests)
    pub fn with_control(
        stamp_dir: impl Into<PathBuf>,
        control: Arc<dyn ProcessControl>,
        timings: KillTimings,
    ) -> Self {
        Self {
            control,
            timings,
            stamp_dir: stamp_dir.into(),
        }
    }

    /// Stamp-file path for a spec's instance
    pub fn stamp_path(&self, spec: &ProcessSpec) -> PathBuf {
        self.stamp_dir.join(spec.stamp_file_name())
    }

    /// Stage the instance's files into its work directory
    ///
    /// The binary is copied to `<work_dir>/<instance_name>`; each companion
    /// file gets the instance suffix inserted before its extension. A copy
    /// is skipped when the destination is already newer than the source, so
    /// repeated starts of the same build are cheap.
    pub fn stage(&self, spec: &ProcessSpec) -> Result<PathBuf> {
        std::fs::create_dir_all(&spec.work_dir)?;

        let staged_binary = spec.work_dir.join(spec.instance_name());
        copy_if_newer(&spec.source_dir.join(&spec.program), &staged_binary)?;

        for file in &spec.staged_files {
            let renamed = instance_file_name(file, &spec.suffix);
            copy_if_newer(&spec.source_dir.join(file), &spec.work_dir.join(renamed))?;
        }

        Ok(staged_binary)
    }

    /// Graded shutdown of one pid
    ///
    /// Each stage runs only if the previous one did not confirm
    /// termination. A stage that finds the process already gone counts as
    /// success.
    pub fn kill_process(&self, pid: u32) -> Result<()> {
        if !self.control.is_alive(pid) {
            debug!("Process {pid} already gone");
            return Ok(());
        }

        self.control.request_close(pid)?;
        if self.wait_for_exit(pid, self.timings.close_wait) {
            debug!("Process {pid} exited after close request");
            return Ok(());
        }

        warn!(
            "Process {pid} ignored the close request for {:?}, killing",
            self.timings.close_wait
        );
        self.control.kill(pid)?;
        if self.wait_for_exit(pid, self.timings.kill_wait) {
            debug!("Process {pid} exited after kill");
            return Ok(());
        }

        Err(CoreError::ProcessWait(format!(
            "Process {pid} did not exit within {:?} of the kill",
            self.timings.kill_wait
        )))
    }

    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.control.is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            std::thread::sleep(self.timings.poll_interval.min(timeout));
        }
    }
}

#[cfg(unix)]
impl ProcessAdapter for ProcessLauncher {
    fn find_instances(&self, spec: &ProcessSpec) -> Result<Vec<u32>> {
        super::unix::find_by_name(&spec.instance_name())
    }

    fn start(&self, spec: &ProcessSpec) -> Result<u32> {
        // A duplicate under the derived name would confuse liveness
        // judgement; clear them before starting.
        for pid in self.find_instances(spec)? {
            warn!(
                "Killing pre-existing instance of '{}' (pid {pid})",
                spec.instance_name()
            );
            self.kill_process(pid)?;
        }

        let staged_binary = self.stage(spec)?;
        let stamp = StampFile::new(self.stamp_path(spec));
        stamp.remove()?;

        let args = compose_args(spec, stamp.path());
        let pid = super::unix::spawn_detached(&staged_binary, &args, &spec.work_dir)?;
        info!(
            "Started instance '{}' (pid {pid})",
            spec.instance_name()
        );
        Ok(pid)
    }

    fn kill_process(&self, pid: u32) -> Result<()> {
        ProcessLauncher::kill_process(self, pid)
    }
}

/// Copy `src` to `dst` unless `dst` already has a newer modification time
///
/// Returns whether a copy was performed.
pub fn copy_if_newer(src: &Path, dst: &Path) -> Result<bool> {
    let src_meta = std::fs::metadata(src).map_err(|e| {
        CoreError::Staging(format!("source {} unreadable: {e}", src.display()))
    })?;

    if let Ok(dst_meta) = std::fs::metadata(dst) {
        if let (Ok(src_time), Ok(dst_time)) = (src_meta.modified(), dst_meta.modified()) {
            if dst_time >= src_time {
                debug!("Skipping copy, {} is up to date", dst.display());
                return Ok(false);
            }
        }
    }

    std::fs::copy(src, dst).map_err(|e| {
        CoreError::Staging(format!(
            "copy {} -> {} failed: {e}",
            src.display(),
            dst.display()
        ))
    })?;
    debug!("Staged {} -> {}", src.display(), dst.display());
    Ok(true)
}

/// Insert the instance suffix before the file extension:
/// `app.toml` + `x1` -> `app_x1.toml`
fn instance_file_name(file: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return file.to_string();
    }
    match file.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{suffix}.{ext}"),
        None => format!("{file}_{suffix}"),
    }
}

/// Supervision flags the launched binary must accept, followed by the
/// caller-supplied program arguments
fn compose_args(spec: &ProcessSpec, stamp_path: &Path) -> Vec<String> {
    let mut args = Vec::new();
    if spec.use_stamp_file {
        args.push("--stamp-file".to_string());
        args.push(stamp_path.display().to_string());
    }
    if spec.parent_pid > 0 {
        args.push("--parent-pid".to_string());
        args.push(spec.parent_pid.to_string());
    }
    if let Some(timeout) = spec.timeouts.run_timeout() {
        args.push("--run-timeout-ms".to_string());
        args.push(timeout.as_millis().to_string());
    }
    args.extend(spec.args.iter().cloned());
    args
}
