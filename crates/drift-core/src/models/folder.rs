//! Sync folder model

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Transfer direction policy for a sync folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    Bidirectional,
    UploadOnly,
    DownloadOnly,
}

impl SyncDirection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bidirectional => "bidirectional",
            Self::UploadOnly => "upload_only",
            Self::DownloadOnly => "download_only",
        }
    }
}

impl FromStr for SyncDirection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "bidirectional" => Ok(Self::Bidirectional),
            "upload_only" => Ok(Self::UploadOnly),
            "download_only" => Ok(Self::DownloadOnly),
            other => Err(Error::InvalidInput(format!("unknown direction: {other}"))),
        }
    }
}

/// How divergence between local and remote edits is settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    KeepLocal,
    KeepRemote,
    KeepBoth,
    /// Surface the conflict over the control plane and wait for a resolution.
    Ask,
}

impl ConflictPolicy {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::KeepRemote => "keep_remote",
            Self::KeepBoth => "keep_both",
            Self::Ask => "ask",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "keep_local" => Ok(Self::KeepLocal),
            "keep_remote" => Ok(Self::KeepRemote),
            "keep_both" => Ok(Self::KeepBoth),
            "ask" => Ok(Self::Ask),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict policy: {other}"
            ))),
        }
    }
}

/// A declared pairing of a local directory root and a remote prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFolder {
    /// Stable row identifier
    pub id: i64,
    /// Absolute local directory root
    pub local_root: PathBuf,
    /// Remote object-storage key prefix
    pub remote_prefix: String,
    pub direction: SyncDirection,
    pub enabled: bool,
    pub conflict_policy: ConflictPolicy,
    /// Glob patterns matched against basenames and directory segments
    pub exclude_patterns: Vec<String>,
    /// Optional per-folder transfer cap in bytes per second
    pub bandwidth_cap: Option<u64>,
    /// Optional periodic rescan interval in seconds
    pub poll_interval: Option<u64>,
    /// Unix ms
    pub created_at: i64,
    /// Unix ms
    pub updated_at: i64,
}
