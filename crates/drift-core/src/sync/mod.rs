//! Sync engine: reconciliation, scanning, watching, and transfer execution.

pub mod engine;
pub mod excludes;
pub mod hasher;
pub mod limiter;
pub mod reconciler;
pub mod watcher;
pub mod worker;

use std::path::PathBuf;
use std::time::Duration;

/// Coalescing window for filesystem events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(3);

/// Worker tasks draining the queue.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Attempts granted to a queue entry before it terminal-fails.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 3;

/// Kind of a normalized filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Modify,
    Delete,
    Rename,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Rename => "rename",
        }
    }
}

/// A normalized filesystem event, after debouncing.
#[derive(Debug, Clone)]
pub struct FsEvent {
    /// Absolute path the event refers to
    pub path: PathBuf,
    pub kind: EventKind,
    /// Unix ms at observation time
    pub observed_at: i64,
}
