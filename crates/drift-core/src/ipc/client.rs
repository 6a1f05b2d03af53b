//! Control channel client
//!
//! Used by the CLI and any other local frontend. Connects per request,
//! which matches the daemon's one-frame-per-direction protocol and keeps
//! the client stateless.

use std::path::PathBuf;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::config::DaemonConfig;
use crate::error::{Error, Result};
use crate::models::{Activity, Conflict, ConflictChoice};

use super::protocol::{
    commands, AddFolderRequest, AddFolderResponse, ForceSyncRequest, GetActivityRequest,
    GetActivityResponse, GetConfigResponse, RemoveFolderRequest, Request, ResolveConflictRequest,
    Response, SetConfigRequest, StatusResponse,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the daemon's control socket.
pub struct ControlClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(socket_path: PathBuf, timeout: Duration) -> Self {
        Self {
            socket_path,
            timeout,
        }
    }

    /// Send one raw command frame and read the response frame.
    pub async fn send(&self, command: &str, data: serde_json::Value) -> Result<Response> {
        tokio::time::timeout(self.timeout, self.exchange(command, data))
            .await
            .map_err(|_| {
                Error::Control(format!(
                    "daemon did not answer '{command}' within {}s",
                    self.timeout.as_secs()
                ))
            })?
    }

    async fn exchange(&self, command: &str, data: serde_json::Value) -> Result<Response> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            Error::Control(format!(
                "cannot connect to daemon at {}: {e}",
                self.socket_path.display()
            ))
        })?;
        let (reader, mut writer) = stream.into_split();

        let mut frame = serde_json::to_vec(&Request {
            command: command.to_string(),
            data,
        })?;
        frame.push(b'\n');
        writer.write_all(&frame).await?;
        writer.flush().await?;

        let mut lines = BufReader::new(reader).lines();
        let line = lines
            .next_line()
            .await?
            .ok_or_else(|| Error::Control("daemon closed the connection".into()))?;
        Ok(serde_json::from_str(&line)?)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        command: &str,
        data: impl serde::Serialize,
    ) -> Result<T> {
        let response = self.send(command, serde_json::to_value(data)?).await?;
        if !response.success {
            return Err(Error::Control(
                response.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        let data = response.data.unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(data)?)
    }

    async fn call_empty(&self, command: &str, data: impl serde::Serialize) -> Result<()> {
        let response = self.send(command, serde_json::to_value(data)?).await?;
        if !response.success {
            return Err(Error::Control(
                response.error.unwrap_or_else(|| "unknown error".into()),
            ));
        }
        Ok(())
    }

    pub async fn status(&self) -> Result<StatusResponse> {
        self.call(commands::STATUS, serde_json::Value::Null).await
    }

    pub async fn add_folder(&self, request: &AddFolderRequest) -> Result<AddFolderResponse> {
        self.call(commands::ADD_SYNC_FOLDER, request).await
    }

    pub async fn remove_folder(&self, id: i64) -> Result<()> {
        self.call_empty(commands::REMOVE_SYNC_FOLDER, RemoveFolderRequest { id })
            .await
    }

    pub async fn activity(&self, limit: usize, folder_id: Option<i64>) -> Result<Vec<Activity>> {
        let response: GetActivityResponse = self
            .call(commands::GET_ACTIVITY, GetActivityRequest { limit, folder_id })
            .await?;
        Ok(response.activities)
    }

    pub async fn force_sync(&self, folder_id: Option<i64>) -> Result<()> {
        self.call_empty(commands::FORCE_SYNC, ForceSyncRequest { folder_id })
            .await
    }

    pub async fn get_config(&self) -> Result<DaemonConfig> {
        let response: GetConfigResponse =
            self.call(commands::GET_CONFIG, serde_json::Value::Null).await?;
        Ok(response.config)
    }

    pub async fn set_config(&self, config: &DaemonConfig) -> Result<()> {
        self.call_empty(
            commands::SET_CONFIG,
            SetConfigRequest {
                config: config.clone(),
            },
        )
        .await
    }

    pub async fn resolve_conflict(
        &self,
        conflict_id: i64,
        choice: ConflictChoice,
    ) -> Result<Conflict> {
        self.call(
            commands::RESOLVE_CONFLICT,
            ResolveConflictRequest {
                conflict_id,
                choice,
            },
        )
        .await
    }
}
