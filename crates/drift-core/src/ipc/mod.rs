//! Local control plane: request/response over a Unix socket.

mod client;
mod protocol;
mod server;

pub use client::ControlClient;
pub use protocol::{
    commands, AddFolderRequest, AddFolderResponse, FolderStatus, ForceSyncRequest,
    GetActivityRequest, GetActivityResponse, GetConfigResponse, RemoveFolderRequest, Request,
    ResolveConflictRequest, Response, SetConfigRequest, StatusResponse,
};
pub use server::{serve, CommandHandler};
