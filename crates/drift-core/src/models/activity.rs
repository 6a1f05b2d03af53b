//! Activity log model: append-only record of unit-of-work outcomes.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Outcome kind recorded for an activity entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Success,
    /// A transient failure with attempts remaining
    Retrying,
    Failed,
    Cancelled,
    Conflict,
}

impl ActivityStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Retrying => "retrying",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Conflict => "conflict",
        }
    }
}

impl FromStr for ActivityStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "success" => Ok(Self::Success),
            "retrying" => Ok(Self::Retrying),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "conflict" => Ok(Self::Conflict),
            other => Err(Error::Invariant(format!("unknown activity status: {other}"))),
        }
    }
}

/// One completed or failed unit of work. Never read by the reconciler;
/// retained by age policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    /// Nulled when the owning folder is removed
    pub folder_id: Option<i64>,
    /// Operation name, e.g. `upload`
    pub operation: String,
    pub path: String,
    pub status: ActivityStatus,
    pub details: Option<String>,
    pub error_message: Option<String>,
    pub bytes_transferred: Option<i64>,
    pub duration_ms: Option<i64>,
    /// Unix ms
    pub created_at: i64,
}
