//! Queue entry model: one persisted unit of reconciliation work.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Transfer operation carried by a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOp {
    Upload,
    Download,
    DeleteRemote,
    DeleteLocal,
}

impl QueueOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::DeleteRemote => "delete_remote",
            Self::DeleteLocal => "delete_local",
        }
    }
}

impl FromStr for QueueOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "upload" => Ok(Self::Upload),
            "download" => Ok(Self::Download),
            "delete_remote" => Ok(Self::DeleteRemote),
            "delete_local" => Ok(Self::DeleteLocal),
            // An op string we did not write is corrupt state, not user input.
            other => Err(Error::Invariant(format!("unknown queue op: {other}"))),
        }
    }
}

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Invariant(format!("unknown queue status: {other}"))),
        }
    }
}

/// One pending reconciliation unit for a `(folder, path)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: i64,
    pub folder_id: i64,
    pub relative_path: String,
    pub op: QueueOp,
    /// Higher first
    pub priority: i64,
    pub attempts: i64,
    pub max_attempts: i64,
    pub status: QueueStatus,
    pub error_message: Option<String>,
    /// Unix ms
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}
