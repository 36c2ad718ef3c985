//! Failure classification for work-body errors
//!
//! The retry policy applied after a work body fails is decided by a
//! pluggable classifier function instead of type inspection scattered
//! through the state machine. Classification categories and their policies:
//!
//! - `ResourceExhaustion`: the whole host must stop
//! - `StaleState`: restart immediately
//! - `RetryAfterDelay`: sleep the configured delay, then restart
//! - `Retry`: restart immediately
//! - `Unclassified`: log as error, flag the worker, restart eligible

use crate::{CoreError, WorkError};
use schema::FailureKind;
use std::sync::Arc;

/// Pluggable classifier mapping a work-body error to its failure class
pub type FailureClassifier = Arc<dyn Fn(&WorkError) -> FailureKind + Send + Sync>;

/// Default classifier
///
/// Recognizes out-of-memory I/O errors as resource exhaustion and core
/// run-timeouts as plain retries; everything else is unclassified.
pub fn default_classifier() -> FailureClassifier {
    Arc::new(|error: &WorkError| {
        if let Some(io) = error.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::OutOfMemory {
                return FailureKind::ResourceExhaustion;
            }
        }
        if let Some(core) = error.downcast_ref::<CoreError>() {
            if matches!(core, CoreError::Timeout(_)) {
                return FailureKind::Retry;
            }
        }
        FailureKind::Unclassified
    })
}
