//! Configuration loading and validation
//!
//! Watchdog tunables come from a typed key/value [`SettingsSource`] with a
//! hard-coded default per key; process descriptors are parsed from a TOML
//! `[[processes]]` array with strict field-path validation.

use crate::{CoreError, Result};
use schema::ProcessSpec;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Minimal contract the core requires from a configuration backend
pub trait SettingsSource: Send + Sync {
    /// Raw string value for `key`, or `None` when the backend has no entry
    fn get(&self, key: &str) -> Option<String>;
}

/// Settings keys for the watchdog tunables
pub mod keys {
    /// Watchdog poll frequency
    pub const FREQUENCY_MS: &str = "watchdog.frequencyMs";
    /// Default heartbeat/stamp staleness threshold
    pub const NOT_RESPONDING_MS: &str = "watchdog.notRespondingMs";
    /// Bound on cancel/restart waits issued by the watchdog
    pub const RESTART_TIMEOUT_MS: &str = "watchdog.restartTimeoutMs";
    /// Default delay before restarting a killed process
    pub const RESTART_DELAY_MS: &str = "watchdog.restartDelayMs";
    /// Grace period between requesting host exit and forcing it
    pub const EXIT_GRACE_MS: &str = "watchdog.exitGraceMs";
    /// Directory stamp files live in
    pub const STAMP_DIR: &str = "watchdog.stampDir";
}

fn get_u64(source: &dyn SettingsSource, key: &str, default: u64) -> u64 {
    match source.get(key) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Setting '{key}' has non-numeric value '{raw}'; using default {default}");
            default
        }),
    }
}

/// Watchdog tunables with per-key hard-coded defaults
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchdogSettings {
    /// Poll frequency in milliseconds
    #[serde(default = "default_frequency_ms")]
    pub frequency_ms: u64,
    /// Default not-responding threshold in milliseconds
    #[serde(default = "default_not_responding_ms")]
    pub not_responding_ms: u64,
    /// Cancel/restart wait bound in milliseconds
    #[serde(default = "default_restart_timeout_ms")]
    pub restart_timeout_ms: u64,
    /// Delay before restarting a killed process, in milliseconds
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// Grace period before a forced host exit, in milliseconds
    #[serde(default = "default_exit_grace_ms")]
    pub exit_grace_ms: u64,
    /// Directory stamp files live in
    #[serde(default = "default_stamp_dir")]
    pub stamp_dir: PathBuf,
}

const fn default_frequency_ms() -> u64 {
    1_000
}

const fn default_not_responding_ms() -> u64 {
    60_000
}

const fn default_restart_timeout_ms() -> u64 {
    30_000
}

const fn default_restart_delay_ms() -> u64 {
    5_000
}

const fn default_exit_grace_ms() -> u64 {
    10_000
}

fn default_stamp_dir() -> PathBuf {
    std::env::temp_dir()
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            frequency_ms: default_frequency_ms(),
            not_responding_ms: default_not_responding_ms(),
            restart_timeout_ms: default_restart_timeout_ms(),
            restart_delay_ms: default_restart_delay_ms(),
            exit_grace_ms: default_exit_grace_ms(),
            stamp_dir: default_stamp_dir(),
        }
    }
}

impl WatchdogSettings {
    /// Build settings from a key/value source, falling back to the per-key
    /// defaults
    pub fn from_source(source: &dyn SettingsSource) -> Self {
        Self {
            frequency_ms: get_u64(source, keys::FREQUENCY_MS, default_frequency_ms()),
            not_responding_ms: get_u64(
                source,
                keys::NOT_RESPONDING_MS,
                default_not_responding_ms(),
            ),
            restart_timeout_ms: get_u64(
                source,
                keys::RESTART_TIMEOUT_MS,
                default_restart_timeout_ms(),
            ),
            restart_delay_ms: get_u64(source, keys::RESTART_DELAY_MS, default_restart_delay_ms()),
            exit_grace_ms: get_u64(source, keys::EXIT_GRACE_MS, default_exit_grace_ms()),
            stamp_dir: source
                .get(keys::STAMP_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(default_stamp_dir),
        }
    }

    /// Poll frequency as a Duration
    pub fn frequency(&self) -> Duration {
        Duration::from_millis(self.frequency_ms)
    }

    /// Not-responding threshold as a Duration
    pub fn not_responding(&self) -> Duration {
        Duration::from_millis(self.not_responding_ms)
    }

    /// Restart wait bound as a Duration
    pub fn restart_timeout(&self) -> Duration {
        Duration::from_millis(self.restart_timeout_ms)
    }

    /// Restart delay as a Duration
    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }

    /// Exit grace period as a Duration
    pub fn exit_grace(&self) -> Duration {
        Duration::from_millis(self.exit_grace_ms)
    }

    /// Validate the tunables
    pub fn validate(&self) -> Result<()> {
        if self.frequency_ms == 0 {
            return Err(CoreError::ValidationError(
                "watchdog.frequencyMs: must be > 0".to_string(),
            ));
        }
        if self.not_responding_ms == 0 {
            return Err(CoreError::ValidationError(
                "watchdog.notRespondingMs: must be > 0".to_string(),
            ));
        }
        if self.restart_timeout_ms == 0 {
            return Err(CoreError::ValidationError(
                "watchdog.restartTimeoutMs: must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// TOML-file-backed settings source
///
/// Nested tables are flattened into dotted keys, so `[watchdog]
/// frequencyMs = 500` is read as `watchdog.frequencyMs`.
#[derive(Debug, Default, Clone)]
pub struct TomlSettings {
    values: HashMap<String, String>,
}

impl TomlSettings {
    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(&path).map_err(|e| {
            CoreError::ConfigurationError(format!(
                "Failed to read settings {:?}: {e}",
                path.as_ref()
            ))
        })?;
        Self::parse(&data)
    }

    /// Parse from a TOML string
    pub fn parse(input: &str) -> Result<Self> {
        let value: toml::Value = toml::from_str(input)
            .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {e}")))?;
        let mut values = HashMap::new();
        flatten("", &value, &mut values);
        Ok(Self { values })
    }
}

fn flatten(prefix: &str, value: &toml::Value, out: &mut HashMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, inner) in table {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, inner, out);
            }
        }
        toml::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

impl SettingsSource for TomlSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Top-level TOML structure for supervised process descriptors
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessesFile {
    /// List of process instances to supervise
    pub processes: Vec<ProcessSpec>,
}

impl ProcessesFile {
    /// Validate the configuration with field-path error messages
    pub fn validate(&self) -> Result<()> {
        if self.processes.is_empty() {
            return Err(CoreError::ValidationError(
                "processes: must contain at least one process".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (i, spec) in self.processes.iter().enumerate() {
            if spec.program.trim().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "processes[{i}].program: cannot be empty"
                )));
            }
            if !seen.insert((spec.program.clone(), spec.suffix.clone())) {
                return Err(CoreError::ValidationError(format!(
                    "processes[{i}]: duplicate instance '{}'",
                    spec.instance_name()
                )));
            }
            if spec.source_dir.as_os_str().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "processes[{i}].sourceDir: cannot be empty"
                )));
            }
            if spec.work_dir.as_os_str().is_empty() {
                return Err(CoreError::ValidationError(format!(
                    "processes[{i}].workDir: cannot be empty"
                )));
            }
            for (j, file) in spec.staged_files.iter().enumerate() {
                if file.trim().is_empty() {
                    return Err(CoreError::ValidationError(format!(
                        "processes[{i}].stagedFiles[{j}]: cannot be empty"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Load process descriptors from a TOML file path
pub fn load_processes_from_toml_path(path: impl AsRef<Path>) -> Result<ProcessesFile> {
    let data = std::fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {e}", path.as_ref()))
    })?;
    load_processes_from_toml_str(&data)
}

/// Load process descriptors from a TOML string
pub fn load_processes_from_toml_str(input: &str) -> Result<ProcessesFile> {
    let cfg: ProcessesFile = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
