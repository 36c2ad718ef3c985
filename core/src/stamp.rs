//! Stamp files: filesystem heartbeats for external processes
//!
//! A stamp file is an otherwise-empty marker whose modification time records
//! the last moment a process proved it was alive. The supervised process
//! refreshes it; the watchdog reads its age.

use crate::{CoreError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Handle to one stamp file
#[derive(Debug, Clone)]
pub struct StampFile {
    path: PathBuf,
}

impl StampFile {
    /// Create a handle for the given path; the file itself is created on the
    /// first [`StampFile::touch`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The stamp path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file or refresh its modification time to now
    pub fn touch(&self) -> Result<()> {
        std::fs::write(&self.path, [])?;
        Ok(())
    }

    /// Age of the stamp: elapsed time since the last refresh
    ///
    /// A missing stamp file surfaces as the underlying `NotFound` I/O error
    /// so callers can distinguish "never stamped" from "stale".
    pub fn age(&self) -> Result<Duration> {
        let modified = std::fs::metadata(&self.path)?.modified()?;
        SystemTime::now()
            .duration_since(modified)
            .map_err(|e| CoreError::Other(format!("stamp mtime is in the future: {e}")))
    }

    /// Whether the stamp file currently exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Delete the stamp file if present
    pub fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                debug!("Removed stale stamp file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
