//! Error types for drift-core

use thiserror::Error;

/// Result type alias using drift-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in drift-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem or socket I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem notification backend error
    #[error("Watcher error: {0}")]
    Watch(#[from] notify::Error),

    /// Remote store operation failed
    #[error(transparent)]
    Remote(#[from] crate::remote::RemoteError),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A new sync folder's root overlaps an existing one
    #[error("Folder root {0} overlaps existing sync folder {1}")]
    FolderOverlap(String, String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The daemon rejected or failed a control command
    #[error("Control channel error: {0}")]
    Control(String),

    /// Exclude pattern failed to compile
    #[error("Invalid exclude pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },

    /// Corrupt on-disk state the daemon cannot proceed from
    #[error("Invariant violation: {0}")]
    Invariant(String),
}
