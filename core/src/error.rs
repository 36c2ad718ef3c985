//! Core error types and utilities

use std::time::Duration;
use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// An operation was attempted in a state that does not permit it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The absolute run timeout elapsed; the work body should unwind
    #[error("Run timed out after {0:?}")]
    Timeout(Duration),

    /// A timed lock/semaphore acquisition did not complete within its bound
    #[error("Lock wait timed out after {0:?}")]
    LockTimeout(Duration),

    /// Cooperative cancellation was observed; this is an expected unwind
    /// path, not a fault
    #[error("Cancelled")]
    Cancelled,

    #[error("Process spawn error: {0}")]
    ProcessSpawn(String),

    #[error("Process signal error: {0}")]
    ProcessSignal(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Other(String),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidState(_) => "VGL001",
            CoreError::Timeout(_) => "VGL002",
            CoreError::LockTimeout(_) => "VGL003",
            CoreError::Cancelled => "VGL004",
            CoreError::ProcessSpawn(_) => "VGL005",
            CoreError::ProcessSignal(_) => "VGL006",
            CoreError::ProcessWait(_) => "VGL007",
            CoreError::Staging(_) => "VGL008",
            CoreError::ConfigurationError(_) => "VGL009",
            CoreError::ValidationError(_) => "VGL010",
            CoreError::IoError(_) => "VGL011",
            CoreError::Other(_) => "VGL999",
        }
    }

    /// Whether this error is the cooperative-cancel unwind
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CoreError::Cancelled)
    }

    /// Whether this error is a distinguished timeout (run or lock)
    pub fn is_timeout(&self) -> bool {
        matches!(self, CoreError::Timeout(_) | CoreError::LockTimeout(_))
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error type produced by work bodies; classified by a
/// [`crate::classify::FailureClassifier`]
pub type WorkError = Box<dyn std::error::Error + Send + Sync + 'static>;

impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}
