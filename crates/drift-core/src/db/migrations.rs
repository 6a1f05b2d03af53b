//! Schema migrations

use rusqlite::Connection;

use crate::error::Result;

/// Ordered migration steps. Position `i` is schema version `i + 1`; startup
/// applies every step past the stored version, each in its own transaction.
const MIGRATIONS: &[&str] = &[
    // Version 1: sync_folders
    "CREATE TABLE sync_folders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        local_root TEXT NOT NULL UNIQUE,
        remote_prefix TEXT NOT NULL,
        direction TEXT NOT NULL DEFAULT 'bidirectional',
        enabled INTEGER NOT NULL DEFAULT 1,
        conflict_policy TEXT NOT NULL DEFAULT 'keep_local',
        exclude_patterns TEXT NOT NULL DEFAULT '[]',
        bandwidth_cap INTEGER,
        poll_interval INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );",
    // Version 2: file_states
    "CREATE TABLE file_states (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        folder_id INTEGER NOT NULL REFERENCES sync_folders(id) ON DELETE CASCADE,
        relative_path TEXT NOT NULL,
        local_hash TEXT,
        remote_hash TEXT,
        local_mtime INTEGER,
        remote_mtime INTEGER,
        local_size INTEGER,
        remote_size INTEGER,
        sync_status TEXT NOT NULL DEFAULT 'pending',
        last_synced_at INTEGER,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE(folder_id, relative_path)
    );",
    // Version 3: sync_queue
    "CREATE TABLE sync_queue (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        folder_id INTEGER NOT NULL REFERENCES sync_folders(id) ON DELETE CASCADE,
        relative_path TEXT NOT NULL,
        op TEXT NOT NULL,
        priority INTEGER NOT NULL DEFAULT 0,
        attempts INTEGER NOT NULL DEFAULT 0,
        max_attempts INTEGER NOT NULL DEFAULT 3,
        status TEXT NOT NULL DEFAULT 'pending',
        error_message TEXT,
        created_at INTEGER NOT NULL,
        started_at INTEGER,
        completed_at INTEGER
    );",
    // Version 4: activity_log
    "CREATE TABLE activity_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        folder_id INTEGER REFERENCES sync_folders(id) ON DELETE SET NULL,
        operation TEXT NOT NULL,
        path TEXT NOT NULL,
        status TEXT NOT NULL,
        details TEXT,
        error_message TEXT,
        bytes_transferred INTEGER,
        duration_ms INTEGER,
        created_at INTEGER NOT NULL
    );",
    // Version 5: conflicts
    "CREATE TABLE conflicts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        folder_id INTEGER NOT NULL REFERENCES sync_folders(id) ON DELETE CASCADE,
        relative_path TEXT NOT NULL,
        local_hash TEXT,
        remote_hash TEXT,
        local_mtime INTEGER,
        remote_mtime INTEGER,
        resolution TEXT,
        resolved INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        resolved_at INTEGER
    );",
    // Version 6: indexes
    "CREATE INDEX idx_file_states_folder ON file_states(folder_id);
     CREATE INDEX idx_file_states_status ON file_states(sync_status);
     CREATE INDEX idx_sync_queue_status ON sync_queue(status);
     CREATE INDEX idx_activity_log_created ON activity_log(created_at DESC);",
];

/// Run all pending migrations.
pub fn run(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        );",
    )?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    for (index, step) in MIGRATIONS.iter().enumerate() {
        let step_version = index as i64 + 1;
        if step_version <= version {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(step)?;
        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [step_version],
        )?;
        tx.commit()?;
        tracing::info!(version = step_version, "applied schema migration");
    }

    Ok(())
}
