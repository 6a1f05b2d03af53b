//! Control channel message shapes
//!
//! Newline-delimited JSON, one object per direction. Requests carry a
//! command name and an opaque payload; responses carry success, data, or an
//! error string.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::DaemonConfig;
use crate::models::{Activity, Conflict, ConflictChoice, ConflictPolicy, SyncDirection};

/// Command names understood by the daemon.
pub mod commands {
    pub const STATUS: &str = "status";
    pub const ADD_SYNC_FOLDER: &str = "add_sync_folder";
    pub const REMOVE_SYNC_FOLDER: &str = "remove_sync_folder";
    pub const GET_ACTIVITY: &str = "get_activity";
    pub const FORCE_SYNC: &str = "force_sync";
    pub const GET_CONFIG: &str = "get_config";
    pub const SET_CONFIG: &str = "set_config";
    pub const RESOLVE_CONFLICT: &str = "resolve_conflict";
}

/// One request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub command: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// One response frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(data: impl Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(value) => Self {
                success: true,
                data: Some(value),
                error: None,
            },
            Err(e) => Self::error(format!("cannot encode response: {e}")),
        }
    }

    pub fn ok_empty() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// `status` response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_running: bool,
    pub uptime_secs: u64,
    pub queue_size: i64,
    pub terminal_failed: i64,
    pub unresolved_conflicts: i64,
    pub folders: Vec<FolderStatus>,
    /// Conflicts awaiting a `resolve_conflict` call.
    pub pending_conflicts: Vec<Conflict>,
}

/// Per-folder block inside `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderStatus {
    pub id: i64,
    pub local_root: PathBuf,
    pub remote_prefix: String,
    pub direction: SyncDirection,
    pub enabled: bool,
    pub pending_files: i64,
    pub pending_queue: i64,
    pub conflicts: i64,
}

/// `add_sync_folder` request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFolderRequest {
    pub local_root: PathBuf,
    pub remote_prefix: String,
    #[serde(default = "default_direction")]
    pub direction: SyncDirection,
    #[serde(default = "default_conflict_policy")]
    pub conflict_policy: ConflictPolicy,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
    #[serde(default)]
    pub bandwidth_cap: Option<u64>,
    #[serde(default)]
    pub poll_interval: Option<u64>,
}

fn default_direction() -> SyncDirection {
    SyncDirection::Bidirectional
}

fn default_conflict_policy() -> ConflictPolicy {
    ConflictPolicy::KeepLocal
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddFolderResponse {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveFolderRequest {
    pub id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetActivityRequest {
    #[serde(default = "default_activity_limit")]
    pub limit: usize,
    #[serde(default)]
    pub folder_id: Option<i64>,
}

fn default_activity_limit() -> usize {
    50
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetActivityResponse {
    pub activities: Vec<Activity>,
}

/// `force_sync` request payload; no folder means every enabled folder.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForceSyncRequest {
    #[serde(default)]
    pub folder_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetConfigResponse {
    pub config: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetConfigRequest {
    pub config: DaemonConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveConflictRequest {
    pub conflict_id: i64,
    pub choice: ConflictChoice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_data_defaults_to_null() {
        let request: Request = serde_json::from_str(r#"{"command": "status"}"#).unwrap();
        assert_eq!(request.command, "status");
        assert!(request.data.is_null());
    }

    #[test]
    fn response_omits_empty_fields() {
        let encoded = serde_json::to_string(&Response::ok_empty()).unwrap();
        assert_eq!(encoded, r#"{"success":true}"#);

        let encoded = serde_json::to_string(&Response::error("nope")).unwrap();
        assert_eq!(encoded, r#"{"success":false,"error":"nope"}"#);
    }

    #[test]
    fn add_folder_request_fills_defaults() {
        let request: AddFolderRequest = serde_json::from_str(
            r#"{"local_root": "/tmp/a", "remote_prefix": "b"}"#,
        )
        .unwrap();
        assert_eq!(request.direction, SyncDirection::Bidirectional);
        assert_eq!(request.conflict_policy, ConflictPolicy::KeepLocal);
        assert!(request.exclude_patterns.is_empty());
    }
}
