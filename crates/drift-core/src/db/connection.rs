//! State store connection management

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;

use crate::error::Result;

use super::migrations;

/// The daemon's single source of truth.
///
/// Wraps one `SQLite` connection behind a mutex: a single-writer discipline
/// that serializes every mutation, which is what makes the queue's
/// dequeue transition safe under concurrent workers.
pub struct StateStore {
    conn: Mutex<Connection>,
}

impl StateStore {
    /// Open the store at the given path, creating it if it doesn't exist.
    ///
    /// Runs migrations automatically.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory store (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure(&conn)?;
        let mut conn = conn;
        migrations::run(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the serialized connection.
    ///
    /// A poisoned mutex means a panic escaped a store method; nothing about
    /// the on-disk state can be trusted past that point.
    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("state store mutex poisoned")
    }
}

/// Configure `SQLite` for a long-running local daemon.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    Ok(())
}
