//! Control channel server
//!
//! Listens on a Unix socket with mode 0600, one newline-delimited JSON
//! frame per direction. Each accepted connection runs in its own task;
//! handler failures become error responses, never dropped connections.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::Result;

use super::protocol::{Request, Response};

/// Per-request handler deadline.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Dispatch target for control commands.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle one command. Implementations return an error `Response`
    /// rather than failing; unknown commands must do the same.
    async fn handle(&self, command: &str, data: serde_json::Value) -> Response;
}

/// Bind the control socket and serve until the shutdown channel trips.
///
/// The socket file is removed before binding and again on the way out.
pub async fn serve(
    socket_path: PathBuf,
    handler: Arc<dyn CommandHandler>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    remove_stale_socket(&socket_path)?;
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let listener = UnixListener::bind(&socket_path)?;
    std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600))?;
    info!(socket = %socket_path.display(), "control server listening");

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, _)) => {
                        let handler = handler.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, handler).await {
                                debug!(error = %e, "control connection ended with error");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "control accept failed");
                    }
                }
            }
        }
    }

    drop(listener);
    remove_stale_socket(&socket_path)?;
    info!("control server stopped");
    Ok(())
}

async fn handle_connection(
    stream: UnixStream,
    handler: Arc<dyn CommandHandler>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                match tokio::time::timeout(
                    REQUEST_TIMEOUT,
                    handler.handle(&request.command, request.data),
                )
                .await
                {
                    Ok(response) => response,
                    Err(_) => Response::error(format!(
                        "command '{}' exceeded the {}s deadline",
                        request.command,
                        REQUEST_TIMEOUT.as_secs()
                    )),
                }
            }
            Err(e) => Response::error(format!("malformed request: {e}")),
        };

        let mut frame = serde_json::to_vec(&response).unwrap_or_else(|e| {
            serde_json::to_vec(&Response::error(format!("cannot encode response: {e}")))
                .unwrap_or_else(|_| br#"{"success":false,"error":"encoding failure"}"#.to_vec())
        });
        frame.push(b'\n');
        writer.write_all(&frame).await?;
        writer.flush().await?;
    }

    Ok(())
}

fn remove_stale_socket(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
