//! File state model: the reconciliation baseline for one path.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Sync status of a tracked path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Pending,
    Conflict,
    Error,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Conflict => "conflict",
            Self::Error => "error",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending" => Ok(Self::Pending),
            "conflict" => Ok(Self::Conflict),
            "error" => Ok(Self::Error),
            other => Err(Error::Invariant(format!("unknown sync status: {other}"))),
        }
    }
}

/// The last known `(local, remote)` observation pair for a path within a
/// folder. A row with `sync_status == Synced` always has equal, non-null
/// hashes on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub id: i64,
    pub folder_id: i64,
    /// `/`-separated path relative to the folder root
    pub relative_path: String,
    pub local_hash: Option<String>,
    pub remote_hash: Option<String>,
    /// Unix ms
    pub local_mtime: Option<i64>,
    /// Unix ms
    pub remote_mtime: Option<i64>,
    pub local_size: Option<i64>,
    pub remote_size: Option<i64>,
    pub sync_status: SyncStatus,
    /// Unix ms
    pub last_synced_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl FileState {
    /// A fresh pending row for a path with no observations yet.
    pub fn pending(folder_id: i64, relative_path: impl Into<String>) -> Self {
        Self {
            id: 0,
            folder_id,
            relative_path: relative_path.into(),
            local_hash: None,
            remote_hash: None,
            local_mtime: None,
            remote_mtime: None,
            local_size: None,
            remote_size: None,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
            created_at: 0,
            updated_at: 0,
        }
    }
}
