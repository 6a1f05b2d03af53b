//! Conflict model: both sides diverged from the last synced baseline.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Resolution choice for a recorded conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictChoice {
    KeepLocal,
    KeepRemote,
    KeepBoth,
}

impl ConflictChoice {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KeepLocal => "keep_local",
            Self::KeepRemote => "keep_remote",
            Self::KeepBoth => "keep_both",
        }
    }
}

impl FromStr for ConflictChoice {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "keep_local" => Ok(Self::KeepLocal),
            "keep_remote" => Ok(Self::KeepRemote),
            "keep_both" => Ok(Self::KeepBoth),
            other => Err(Error::InvalidInput(format!(
                "unknown conflict choice: {other}"
            ))),
        }
    }
}

/// An unresolved (or resolved) divergence recorded for a `(folder, path)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: i64,
    pub folder_id: i64,
    pub relative_path: String,
    pub local_hash: Option<String>,
    pub remote_hash: Option<String>,
    /// Unix ms
    pub local_mtime: Option<i64>,
    /// Unix ms
    pub remote_mtime: Option<i64>,
    /// Set when resolved
    pub resolution: Option<ConflictChoice>,
    pub resolved: bool,
    pub created_at: i64,
    pub resolved_at: Option<i64>,
}
