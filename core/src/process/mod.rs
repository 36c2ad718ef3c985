//! External process management: spawn, signal, enumerate, stage, kill
//!
//! This module provides the child-process half of the supervision core. The
//! [`launcher::ProcessLauncher`] stages and starts instances of external
//! programs and performs graded shutdown; the [`adapter`] traits abstract
//! the OS operations so the watchdog and the kill ladder are testable
//! against mocks.

pub mod adapter;
pub mod launcher;
#[cfg(unix)]
pub mod unix;

pub use adapter::{MockProcessAdapter, MockProcessControl, ProcessAdapter, ProcessControl};
#[cfg(unix)]
pub use adapter::UnixProcessControl;
pub use launcher::{KillTimings, ProcessLauncher};
#[cfg(unix)]
pub use unix::is_process_alive;
