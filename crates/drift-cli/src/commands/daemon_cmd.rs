use std::path::Path;

use drift_core::config::DaemonConfig;
use drift_core::Daemon;

use crate::commands::common::control_client;
use crate::error::CliError;

/// Run the daemon in the foreground until SIGINT/SIGTERM.
pub async fn run_start(data_dir: &Path) -> Result<(), CliError> {
    let config = DaemonConfig::load(data_dir)?;
    let daemon = Daemon::open(data_dir.to_path_buf(), config)?;
    println!("Drift daemon started (data dir: {})", data_dir.display());
    daemon.run_until_signal().await?;
    Ok(())
}

/// Probe the control socket and report.
pub async fn run_status(data_dir: &Path) -> Result<(), CliError> {
    let client = control_client(data_dir);
    match client.status().await {
        Ok(status) => {
            println!("Daemon: running");
            println!("Uptime: {}s", status.uptime_secs);
            println!("Queue size: {}", status.queue_size);
            println!("Sync folders: {}", status.folders.len());
        }
        Err(_) => {
            println!("Daemon: not running");
        }
    }
    Ok(())
}
