//! Persistent entity types shared by the store, engine, and control plane.

mod activity;
mod conflict;
mod file_state;
mod folder;
mod queue;

pub use activity::{Activity, ActivityStatus};
pub use conflict::{Conflict, ConflictChoice};
pub use file_state::{FileState, SyncStatus};
pub use folder::{ConflictPolicy, SyncDirection, SyncFolder};
pub use queue::{QueueEntry, QueueOp, QueueStatus};
