//! Supervised external process descriptors
//!
//! A [`ProcessSpec`] describes one instance of an external program the
//! watchdog keeps alive. Identity is the (program, suffix) pair: it derives
//! both the OS process name the watchdog enumerates and the stamp-file name
//! the instance refreshes as its heartbeat.

use crate::TimeoutPolicy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete specification for one supervised external process instance
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Program name (binary file name in `source_dir`, without path)
    pub program: String,

    /// Per-instance suffix; several instances of the same program coexist
    /// under distinct derived names. Empty means a single unsuffixed instance.
    #[serde(default)]
    pub suffix: String,

    /// Program-specific arguments appended after the supervision flags
    #[serde(default)]
    pub args: Vec<String>,

    /// Parent process id the instance must watch; 0 means none
    #[serde(default)]
    pub parent_pid: u32,

    /// Whether the instance publishes a stamp-file heartbeat
    #[serde(default = "default_use_stamp_file")]
    pub use_stamp_file: bool,

    /// Directory holding the program binary and its companion files
    pub source_dir: PathBuf,

    /// Directory the instance-renamed copies are staged into
    pub work_dir: PathBuf,

    /// Companion files (config, log routing) staged next to the binary as
    /// instance-renamed copies
    #[serde(default)]
    pub staged_files: Vec<String>,

    /// Timeout tunables for this instance; unset fields fall back to the
    /// watchdog defaults
    #[serde(default)]
    pub timeouts: TimeoutPolicy,
}

const fn default_use_stamp_file() -> bool {
    true
}

impl ProcessSpec {
    /// Derived OS process name: `program_suffix`, or `program` when the
    /// suffix is empty
    pub fn instance_name(&self) -> String {
        if self.suffix.is_empty() {
            self.program.clone()
        } else {
            format!("{}_{}", self.program, self.suffix)
        }
    }

    /// Derived stamp-file name for this instance
    pub fn stamp_file_name(&self) -> String {
        format!("{}.stamp", self.instance_name())
    }

    /// Effective not-responding threshold given a watchdog-wide fallback
    pub fn not_responding_or(&self, fallback: Duration) -> Duration {
        self.timeouts.not_responding().unwrap_or(fallback)
    }

    /// Effective restart delay given a watchdog-wide fallback
    pub fn restart_delay_or(&self, fallback: Duration) -> Duration {
        self.timeouts.restart_delay().unwrap_or(fallback)
    }
}
