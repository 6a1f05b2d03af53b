//! Embedded state store: folders, file states, queue, activity, conflicts.

mod activity;
mod conflicts;
mod connection;
mod files;
mod folders;
mod migrations;
mod queue;

pub use activity::NewActivity;
pub use connection::StateStore;
pub use folders::NewFolder;
pub use queue::{backoff_delay, NewQueueEntry};
