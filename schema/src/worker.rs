//! Worker lifecycle types: status codes, timeout policy, failure classes
//!
//! This module contains the shared data structures used by the worker state
//! machine and the watchdog in the Vigil supervision system.
//!
//! ## Worker Lifecycle
//!
//! Workers progress through the following states:
//! - `Available`: no run is in flight, the worker can be requested
//! - `Requested`: a start has been committed but the body has not begun
//! - `Running`: the work body is executing
//! - `Cancelling`: a cancel has been issued and the body has not yet yielded
//! - `Aborted`: a forced abort was attempted; the worker must be reset
//!
//! Transitions are performed with compare-and-swap on the `u8` code, so the
//! enum carries explicit `as_code`/`from_code` conversions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Current state of a supervised worker
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum WorkerStatus {
    /// No run is in flight; the worker can be requested
    Available = 0,
    /// A start has been committed but the body has not begun running
    Requested = 1,
    /// The work body is executing
    Running = 2,
    /// A cancel has been issued and the body has not yet yielded
    Cancelling = 3,
    /// A forced abort was attempted; the worker rejects starts until reset
    Aborted = 4,
}

impl WorkerStatus {
    /// Integer code used for atomic storage
    pub fn as_code(self) -> u8 {
        self as u8
    }

    /// Decode a status from its atomic storage code
    ///
    /// Returns `None` for codes outside the closed enum.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(WorkerStatus::Available),
            1 => Some(WorkerStatus::Requested),
            2 => Some(WorkerStatus::Running),
            3 => Some(WorkerStatus::Cancelling),
            4 => Some(WorkerStatus::Aborted),
            _ => None,
        }
    }

    /// Check if a run is in flight (requested, running, or cancelling)
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            WorkerStatus::Requested | WorkerStatus::Running | WorkerStatus::Cancelling
        )
    }

    /// Check if the worker can accept a new request
    pub fn is_available(&self) -> bool {
        matches!(self, WorkerStatus::Available)
    }

    /// Check if the worker is mid-cancellation
    pub fn is_cancelling(&self) -> bool {
        matches!(self, WorkerStatus::Cancelling)
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerStatus::Available => "available",
            WorkerStatus::Requested => "requested",
            WorkerStatus::Running => "running",
            WorkerStatus::Cancelling => "cancelling",
            WorkerStatus::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Timeout tunables for a worker or supervised process
///
/// Every field is optional: an unset value falls back to the watchdog-wide
/// default, which itself falls back to the configured global default. Use
/// [`TimeoutPolicy::or`] to perform that layering.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutPolicy {
    /// Absolute run timeout in milliseconds; a run exceeding it is unwound
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_ms: Option<u64>,

    /// Heartbeat age in milliseconds beyond which the watchdog judges the
    /// worker/process stalled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_responding_ms: Option<u64>,

    /// Delay in milliseconds before a restart attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_delay_ms: Option<u64>,

    /// Bound in milliseconds on how long a cancel/restart waits for the body
    /// to yield
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_timeout_ms: Option<u64>,
}

impl TimeoutPolicy {
    /// Get the absolute run timeout as a Duration
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }

    /// Get the not-responding threshold as a Duration
    pub fn not_responding(&self) -> Option<Duration> {
        self.not_responding_ms.map(Duration::from_millis)
    }

    /// Get the restart delay as a Duration
    pub fn restart_delay(&self) -> Option<Duration> {
        self.restart_delay_ms.map(Duration::from_millis)
    }

    /// Get the restart timeout as a Duration
    pub fn restart_timeout(&self) -> Option<Duration> {
        self.restart_timeout_ms.map(Duration::from_millis)
    }

    /// Layer this policy over a fallback: set fields win, unset fields are
    /// taken from `fallback`.
    pub fn or(&self, fallback: &TimeoutPolicy) -> TimeoutPolicy {
        TimeoutPolicy {
            run_timeout_ms: self.run_timeout_ms.or(fallback.run_timeout_ms),
            not_responding_ms: self.not_responding_ms.or(fallback.not_responding_ms),
            restart_delay_ms: self.restart_delay_ms.or(fallback.restart_delay_ms),
            restart_timeout_ms: self.restart_timeout_ms.or(fallback.restart_timeout_ms),
        }
    }
}

/// Classification of a work-body failure, determining the retry policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Resource exhaustion: the whole host must stop
    ResourceExhaustion,
    /// Stale/optimistic-concurrency conflict: restart immediately
    StaleState,
    /// Temporary condition: sleep the configured delay, then restart
    RetryAfterDelay,
    /// Temporary condition: restart immediately
    Retry,
    /// Not recognized: log, flag the worker, restart eligible
    Unclassified,
}
