use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use drift_core::{ConflictChoice, ConflictPolicy, SyncDirection};

#[derive(Parser)]
#[command(name = "drift")]
#[command(about = "Keep local folders in sync with remote object storage")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the daemon data directory
    #[arg(long, global = true, value_name = "PATH")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage the background daemon
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
    /// Show daemon status: folders, queue depth, conflicts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage sync folders
    Folder {
        #[command(subcommand)]
        command: FolderCommands,
    },
    /// Show recent transfer activity
    Activity {
        /// Number of entries to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Only show activity for one folder
        #[arg(long, value_name = "ID")]
        folder: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Trigger a full scan now (returns immediately; poll `status`)
    Sync {
        /// Only scan one folder
        #[arg(long, value_name = "ID")]
        folder: Option<i64>,
    },
    /// Resolve a pending sync conflict
    Resolve {
        /// Conflict id (see `drift status`)
        conflict_id: i64,
        /// Which side wins
        #[arg(value_enum)]
        choice: ChoiceArg,
    },
    /// Inspect or update daemon configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum DaemonCommands {
    /// Run the daemon in the foreground
    Start,
    /// Check whether the daemon is reachable
    Status,
}

#[derive(Subcommand)]
pub enum FolderCommands {
    /// Declare a new sync folder
    Add {
        /// Absolute local directory root
        local_root: PathBuf,
        /// Remote object key prefix
        remote_prefix: String,
        /// Transfer direction
        #[arg(long, value_enum, default_value_t = DirectionArg::Bidirectional)]
        direction: DirectionArg,
        /// Conflict handling policy
        #[arg(long, value_enum, default_value_t = PolicyArg::KeepLocal)]
        conflict_policy: PolicyArg,
        /// Glob pattern to exclude (repeatable)
        #[arg(long = "exclude", value_name = "GLOB")]
        exclude_patterns: Vec<String>,
        /// Per-folder transfer cap in bytes per second
        #[arg(long, value_name = "BYTES_PER_SEC")]
        bandwidth_cap: Option<u64>,
    },
    /// Remove a sync folder and all of its tracked state
    Remove {
        /// Folder id (see `drift status`)
        id: i64,
    },
    /// List declared sync folders
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the active configuration as JSON
    Get,
    /// Replace the configuration with a JSON document
    Set {
        /// Full configuration as a JSON string, or @path to read a file
        document: String,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum DirectionArg {
    Bidirectional,
    UploadOnly,
    DownloadOnly,
}

impl From<DirectionArg> for SyncDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Bidirectional => Self::Bidirectional,
            DirectionArg::UploadOnly => Self::UploadOnly,
            DirectionArg::DownloadOnly => Self::DownloadOnly,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum PolicyArg {
    KeepLocal,
    KeepRemote,
    KeepBoth,
    Ask,
}

impl From<PolicyArg> for ConflictPolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::KeepLocal => Self::KeepLocal,
            PolicyArg::KeepRemote => Self::KeepRemote,
            PolicyArg::KeepBoth => Self::KeepBoth,
            PolicyArg::Ask => Self::Ask,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ChoiceArg {
    KeepLocal,
    KeepRemote,
    KeepBoth,
}

impl From<ChoiceArg> for ConflictChoice {
    fn from(value: ChoiceArg) -> Self {
        match value {
            ChoiceArg::KeepLocal => Self::KeepLocal,
            ChoiceArg::KeepRemote => Self::KeepRemote,
            ChoiceArg::KeepBoth => Self::KeepBoth,
        }
    }
}
