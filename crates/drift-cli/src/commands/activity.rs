use std::path::Path;

use crate::commands::common::{control_client, daemon_error, format_bytes, format_timestamp};
use crate::error::CliError;

pub async fn run_activity(
    data_dir: &Path,
    limit: usize,
    folder: Option<i64>,
    as_json: bool,
) -> Result<(), CliError> {
    let client = control_client(data_dir);
    let activities = client.activity(limit, folder).await.map_err(daemon_error)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&activities)?);
        return Ok(());
    }

    if activities.is_empty() {
        println!("No activity recorded.");
        return Ok(());
    }

    for activity in &activities {
        let mut line = format!(
            "{}  {:<13} {:<9} {}",
            format_timestamp(activity.created_at),
            activity.operation,
            activity.status.as_str(),
            activity.path,
        );
        if let Some(bytes) = activity.bytes_transferred {
            line.push_str(&format!("  ({})", format_bytes(bytes)));
        }
        if let Some(error) = &activity.error_message {
            line.push_str(&format!("  - {error}"));
        }
        println!("{line}");
    }
    Ok(())
}
