use std::path::PathBuf;

use chrono::{Local, TimeZone};
use drift_core::config::{default_data_dir, socket_path};
use drift_core::ipc::ControlClient;

use crate::error::CliError;

/// Resolve the daemon data directory: explicit flag, else platform default.
pub fn resolve_data_dir(override_dir: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match override_dir {
        Some(dir) => Ok(dir),
        None => Ok(default_data_dir()?),
    }
}

/// Control client for the daemon socket under the data directory.
pub fn control_client(data_dir: &std::path::Path) -> ControlClient {
    ControlClient::new(socket_path(data_dir))
}

/// Map connection-level control errors onto the friendly hint.
pub fn daemon_error(error: drift_core::Error) -> CliError {
    match &error {
        drift_core::Error::Control(message) if message.contains("cannot connect") => {
            CliError::DaemonUnreachable
        }
        _ => CliError::Core(error),
    }
}

/// Human-readable local timestamp from unix milliseconds.
pub fn format_timestamp(unix_ms: i64) -> String {
    Local
        .timestamp_millis_opt(unix_ms)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| unix_ms.to_string())
}

/// Human-readable byte count.
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_format_scales() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KiB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MiB");
    }
}
