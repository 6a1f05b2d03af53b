use std::path::Path;

use drift_core::ConflictChoice;

use crate::commands::common::{control_client, daemon_error, format_timestamp};
use crate::error::CliError;

/// Schedule a full scan. The daemon returns before the scan completes;
/// `drift status` shows progress.
pub async fn run_sync(data_dir: &Path, folder: Option<i64>) -> Result<(), CliError> {
    let client = control_client(data_dir);
    client.force_sync(folder).await.map_err(daemon_error)?;
    match folder {
        Some(id) => println!("Scan scheduled for folder {id}."),
        None => println!("Scan scheduled for all folders."),
    }
    Ok(())
}

pub async fn run_status(data_dir: &Path, as_json: bool) -> Result<(), CliError> {
    let client = control_client(data_dir);
    let status = client.status().await.map_err(daemon_error)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("Daemon: running ({}s uptime)", status.uptime_secs);
    println!(
        "Queue: {} pending, {} terminally failed",
        status.queue_size, status.terminal_failed
    );
    println!("Conflicts awaiting resolution: {}", status.unresolved_conflicts);

    if status.folders.is_empty() {
        println!("No sync folders declared.");
    } else {
        println!("Folders:");
        for folder in &status.folders {
            println!(
                "  [{}] {} -> {}  pending={} queued={} conflicts={}",
                folder.id,
                folder.local_root.display(),
                folder.remote_prefix,
                folder.pending_files,
                folder.pending_queue,
                folder.conflicts,
            );
        }
    }

    if !status.pending_conflicts.is_empty() {
        println!("Pending conflicts (resolve with `drift resolve <id> <choice>`):");
        for conflict in &status.pending_conflicts {
            println!(
                "  [{}] folder {} {}  (since {})",
                conflict.id,
                conflict.folder_id,
                conflict.relative_path,
                format_timestamp(conflict.created_at),
            );
        }
    }
    Ok(())
}

pub async fn run_resolve(
    data_dir: &Path,
    conflict_id: i64,
    choice: ConflictChoice,
) -> Result<(), CliError> {
    let client = control_client(data_dir);
    let resolved = client
        .resolve_conflict(conflict_id, choice)
        .await
        .map_err(daemon_error)?;
    println!(
        "Resolved conflict {} on {} with {}",
        resolved.id,
        resolved.relative_path,
        choice.as_str()
    );
    Ok(())
}
