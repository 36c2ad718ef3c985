//! Reference supervised binary
//!
//! Implements the supervised side of the watchdog contract: refresh the
//! stamp file, watch the parent process, honor the absolute run timeout.
//! Launched by the watchdog with the supervision flags below; anything
//! after `--` is program-specific and ignored here.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use vigil_core::{CoreError, Liveness, ProcessLifecycle, ProcessLifecycleConfig};

#[derive(Parser)]
#[command(name = "vigil-agent")]
#[command(about = "Reference supervised process for the Vigil watchdog")]
#[command(version)]
struct Cli {
    /// Stamp file to refresh as the liveness heartbeat
    #[arg(long)]
    stamp_file: Option<PathBuf>,

    /// Parent process id to watch; exit when it disappears (0 = none)
    #[arg(long, default_value_t = 0)]
    parent_pid: u32,

    /// Absolute run timeout in milliseconds
    #[arg(long)]
    run_timeout_ms: Option<u64>,

    /// Interval between heartbeats in milliseconds
    #[arg(long, default_value_t = 500)]
    beat_interval_ms: u64,

    /// Program-specific arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    rest: Vec<String>,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    if let Err(e) = vigil_core::utils::init_tracing("info") {
        eprintln!("tracing init failed: {e}");
    }

    info!(
        "Agent starting (stamp: {:?}, parent: {}, timeout: {:?})",
        cli.stamp_file, cli.parent_pid, cli.run_timeout_ms
    );
    if !cli.rest.is_empty() {
        info!("Program arguments: {:?}", cli.rest);
    }

    let lifecycle = ProcessLifecycle::new(ProcessLifecycleConfig::new(
        cli.stamp_file,
        cli.parent_pid,
        cli.run_timeout_ms.map(Duration::from_millis),
    ));

    let beat_interval = Duration::from_millis(cli.beat_interval_ms.max(1));
    loop {
        match lifecycle.set_active() {
            Ok(()) => std::thread::sleep(beat_interval),
            Err(CoreError::Cancelled) => {
                info!("Shutdown requested after {:?}; exiting", lifecycle.uptime());
                return std::process::ExitCode::SUCCESS;
            }
            Err(e) => {
                warn!("Beat failed after {:?}: {e}; exiting", lifecycle.uptime());
                return std::process::ExitCode::FAILURE;
            }
        }
    }
}
