use std::path::Path;

use drift_core::config::DaemonConfig;

use crate::commands::common::{control_client, daemon_error};
use crate::error::CliError;

pub async fn run_get(data_dir: &Path) -> Result<(), CliError> {
    let client = control_client(data_dir);
    match client.get_config().await {
        Ok(config) => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        // Daemon down: fall back to the on-disk file so the command still
        // works for editing before first start.
        Err(drift_core::Error::Control(_)) => {
            let config = DaemonConfig::load(data_dir)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Err(e) => Err(daemon_error(e)),
    }
}

/// Replace the configuration. `document` is a JSON string, or `@path` to
/// read the document from a file.
pub async fn run_set(data_dir: &Path, document: &str) -> Result<(), CliError> {
    let raw = match document.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path)?,
        None => document.to_string(),
    };
    let config: DaemonConfig = serde_json::from_str(&raw)?;
    config.validate().map_err(CliError::Core)?;

    let client = control_client(data_dir);
    match client.set_config(&config).await {
        Ok(()) => {
            println!("Configuration updated.");
            Ok(())
        }
        // Daemon down: write the file directly; it is read on next start.
        Err(drift_core::Error::Control(_)) => {
            config.save(data_dir)?;
            println!(
                "Daemon not running; wrote {}",
                data_dir.join(drift_core::config::CONFIG_FILE).display()
            );
            Ok(())
        }
        Err(e) => Err(daemon_error(e)),
    }
}
