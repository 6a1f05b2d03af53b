//! Remote object store collaborator.
//!
//! The daemon treats the storage service as opaque: the worker pool only
//! sees the [`RemoteStore`] trait. An HTTP implementation talks to the
//! hosted service; an in-memory implementation backs the test suite.

mod http;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use http::HttpRemoteStore;
pub use memory::MemoryRemoteStore;

/// Errors surfaced by remote store operations.
///
/// The worker's retry policy hangs off [`RemoteError::is_transient`]:
/// transient failures consume an attempt and back off, permanent ones
/// terminal-fail the queue entry immediately.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote request timed out: {0}")]
    Timeout(String),

    /// Connection failures and 5xx responses.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("remote object not found: {0}")]
    NotFound(String),

    /// Invalid or expired credentials, or access denied (401/403).
    #[error("remote access denied: {0}")]
    Denied(String),

    /// Any other 4xx the service returned.
    #[error("remote rejected request: {0}")]
    Rejected(String),

    #[error("remote transport error: {0}")]
    Transport(String),
}

impl RemoteError {
    /// Whether retrying the operation could plausibly succeed.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Unavailable(_) | Self::Transport(_)
        )
    }
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Result of a successful `put`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    /// Content digest assigned by the service (hex SHA-256 of the body).
    pub etag: String,
    pub size: u64,
}

/// A downloaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBlob {
    pub bytes: Vec<u8>,
    pub etag: String,
    /// Unix ms, when the service reports one
    pub mtime: Option<i64>,
}

/// One object in a listing or stat response.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
    pub etag: String,
    /// Unix ms
    pub mtime: Option<i64>,
}

/// The opaque object-storage collaborator consumed by the worker pool.
///
/// All operations may fail transiently; callers decide retry policy from the
/// error classification.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Store an object, returning the service-assigned digest and size.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> RemoteResult<PutOutcome>;

    /// Fetch an object's bytes and metadata.
    async fn get(&self, key: &str) -> RemoteResult<RemoteBlob>;

    /// Remove an object. Removing a missing object is not an error.
    async fn delete(&self, key: &str) -> RemoteResult<()>;

    /// List objects under a prefix.
    async fn list(&self, prefix: &str) -> RemoteResult<Vec<RemoteObject>>;

    /// Metadata for one object, or `None` if absent.
    async fn stat(&self, key: &str) -> RemoteResult<Option<RemoteObject>>;

    /// Liveness probe.
    async fn ping(&self) -> RemoteResult<()>;
}

/// Source of the bearer token attached to remote requests.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn current_token(&self) -> RemoteResult<String>;
}

/// A fixed token read from configuration.
pub struct StaticCredentials {
    token: String,
}

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn current_token(&self) -> RemoteResult<String> {
        Ok(self.token.clone())
    }
}
