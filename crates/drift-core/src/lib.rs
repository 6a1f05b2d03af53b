//! drift-core - Sync daemon core for Drift
//!
//! This crate contains the reconciliation engine, durable work queue,
//! filesystem watchers, worker pool, state store, and the local control
//! plane shared by the daemon and the CLI.

pub mod config;
pub mod daemon;
pub mod db;
pub mod error;
pub mod ipc;
pub mod models;
pub mod remote;
pub mod sync;
pub mod util;

pub use daemon::Daemon;
pub use error::{Error, Result};
pub use models::{
    Activity, ActivityStatus, Conflict, ConflictChoice, ConflictPolicy, FileState, QueueEntry,
    QueueOp, QueueStatus, SyncDirection, SyncFolder, SyncStatus,
};
