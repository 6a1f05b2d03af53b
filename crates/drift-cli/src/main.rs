//! Drift CLI - daemon entry point and control-plane frontend
//!
//! `drift daemon start` runs the sync daemon; every other subcommand talks
//! to a running daemon over its local control socket.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands, ConfigCommands, DaemonCommands, FolderCommands};
use crate::commands::common::resolve_data_dir;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("drift=info".parse().expect("valid directive")),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir)?;

    match cli.command {
        Commands::Daemon { command } => match command {
            DaemonCommands::Start => commands::daemon_cmd::run_start(&data_dir).await?,
            DaemonCommands::Status => commands::daemon_cmd::run_status(&data_dir).await?,
        },
        Commands::Status { json } => commands::sync_cmd::run_status(&data_dir, json).await?,
        Commands::Folder { command } => match command {
            FolderCommands::Add {
                local_root,
                remote_prefix,
                direction,
                conflict_policy,
                exclude_patterns,
                bandwidth_cap,
            } => {
                commands::folder::run_add(
                    &data_dir,
                    local_root,
                    remote_prefix,
                    direction.into(),
                    conflict_policy.into(),
                    exclude_patterns,
                    bandwidth_cap,
                )
                .await?;
            }
            FolderCommands::Remove { id } => {
                commands::folder::run_remove(&data_dir, id).await?;
            }
            FolderCommands::List { json } => {
                commands::folder::run_list(&data_dir, json).await?;
            }
        },
        Commands::Activity {
            limit,
            folder,
            json,
        } => commands::activity::run_activity(&data_dir, limit, folder, json).await?,
        Commands::Sync { folder } => commands::sync_cmd::run_sync(&data_dir, folder).await?,
        Commands::Resolve {
            conflict_id,
            choice,
        } => commands::sync_cmd::run_resolve(&data_dir, conflict_id, choice.into()).await?,
        Commands::Config { command } => match command {
            ConfigCommands::Get => commands::config_cmd::run_get(&data_dir).await?,
            ConfigCommands::Set { document } => {
                commands::config_cmd::run_set(&data_dir, &document).await?;
            }
        },
    }

    Ok(())
}
