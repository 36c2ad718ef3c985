//! Schema definitions for Vigil
//!
//! This crate contains the shared data structures used across the Vigil
//! supervision framework: worker lifecycle status, timeout policies,
//! failure classifications, and supervised process descriptors. All types
//! here implement JSON Schema generation for external consumption.

pub mod process;
pub mod worker;

pub use process::ProcessSpec;
pub use worker::{FailureKind, TimeoutPolicy, WorkerStatus};
