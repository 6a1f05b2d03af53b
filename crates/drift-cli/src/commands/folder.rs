use std::path::{Path, PathBuf};

use drift_core::ipc::AddFolderRequest;
use drift_core::{ConflictPolicy, SyncDirection};

use crate::commands::common::{control_client, daemon_error};
use crate::error::CliError;

#[allow(clippy::too_many_arguments)]
pub async fn run_add(
    data_dir: &Path,
    local_root: PathBuf,
    remote_prefix: String,
    direction: SyncDirection,
    conflict_policy: ConflictPolicy,
    exclude_patterns: Vec<String>,
    bandwidth_cap: Option<u64>,
) -> Result<(), CliError> {
    let local_root = local_root
        .canonicalize()
        .map_err(|e| CliError::InvalidArgument(format!("{}: {e}", local_root.display())))?;

    let client = control_client(data_dir);
    let added = client
        .add_folder(&AddFolderRequest {
            local_root: local_root.clone(),
            remote_prefix: remote_prefix.clone(),
            direction,
            conflict_policy,
            exclude_patterns,
            bandwidth_cap,
            poll_interval: None,
        })
        .await
        .map_err(daemon_error)?;

    println!(
        "Added sync folder {} ({} -> {})",
        added.id,
        local_root.display(),
        remote_prefix
    );
    Ok(())
}

pub async fn run_remove(data_dir: &Path, id: i64) -> Result<(), CliError> {
    let client = control_client(data_dir);
    client.remove_folder(id).await.map_err(daemon_error)?;
    println!("Removed sync folder {id}");
    Ok(())
}

pub async fn run_list(data_dir: &Path, as_json: bool) -> Result<(), CliError> {
    let client = control_client(data_dir);
    let status = client.status().await.map_err(daemon_error)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status.folders)?);
        return Ok(());
    }

    if status.folders.is_empty() {
        println!("No sync folders declared.");
        return Ok(());
    }

    for folder in &status.folders {
        let state = if folder.enabled { "enabled" } else { "disabled" };
        println!(
            "[{}] {} -> {} ({state}, {} queued, {} conflicts)",
            folder.id,
            folder.local_root.display(),
            folder.remote_prefix,
            folder.pending_queue,
            folder.conflicts,
        );
    }
    Ok(())
}
