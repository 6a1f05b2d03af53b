//! File state repository

use rusqlite::{params, Row};

use crate::error::Result;
use crate::models::{FileState, SyncStatus};
use crate::util::unix_millis_now;

use super::StateStore;

impl StateStore {
    /// Insert or update the state row for `(folder, path)`.
    pub fn upsert_file_state(&self, state: &FileState) -> Result<FileState> {
        let now = unix_millis_now();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO file_states (
                folder_id, relative_path, local_hash, remote_hash,
                local_mtime, remote_mtime, local_size, remote_size,
                sync_status, last_synced_at, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
             ON CONFLICT(folder_id, relative_path) DO UPDATE SET
                local_hash = excluded.local_hash,
                remote_hash = excluded.remote_hash,
                local_mtime = excluded.local_mtime,
                remote_mtime = excluded.remote_mtime,
                local_size = excluded.local_size,
                remote_size = excluded.remote_size,
                sync_status = excluded.sync_status,
                last_synced_at = excluded.last_synced_at,
                updated_at = excluded.updated_at",
            params![
                state.folder_id,
                state.relative_path,
                state.local_hash,
                state.remote_hash,
                state.local_mtime,
                state.remote_mtime,
                state.local_size,
                state.remote_size,
                state.sync_status.as_str(),
                state.last_synced_at,
                now,
            ],
        )?;
        drop(conn);

        self.file_state(state.folder_id, &state.relative_path)?
            .ok_or_else(|| {
                crate::error::Error::Invariant(format!(
                    "file state vanished after upsert: {}",
                    state.relative_path
                ))
            })
    }

    /// Fetch the baseline for one path, if any.
    pub fn file_state(&self, folder_id: i64, relative_path: &str) -> Result<Option<FileState>> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!(
                "SELECT {STATE_COLUMNS} FROM file_states
                 WHERE folder_id = ?1 AND relative_path = ?2"
            ),
            params![folder_id, relative_path],
            parse_state,
        );
        match result {
            Ok(state) => Ok(Some(state?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List states for a folder, optionally filtered by status.
    pub fn list_file_states(
        &self,
        folder_id: i64,
        status: Option<SyncStatus>,
    ) -> Result<Vec<FileState>> {
        let conn = self.conn();
        let rows = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {STATE_COLUMNS} FROM file_states
                     WHERE folder_id = ?1 AND sync_status = ?2
                     ORDER BY relative_path"
                ))?;
                let result = stmt
                    .query_map(params![folder_id, status.as_str()], parse_state)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {STATE_COLUMNS} FROM file_states
                     WHERE folder_id = ?1 ORDER BY relative_path"
                ))?;
                let result = stmt
                    .query_map([folder_id], parse_state)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
        };
        rows.into_iter().collect()
    }

    /// Drop the state row for a path (file gone on both sides).
    pub fn delete_file_state(&self, folder_id: i64, relative_path: &str) -> Result<()> {
        self.conn().execute(
            "DELETE FROM file_states WHERE folder_id = ?1 AND relative_path = ?2",
            params![folder_id, relative_path],
        )?;
        Ok(())
    }

    /// Flip a path's status without touching the observations.
    pub fn set_sync_status(
        &self,
        folder_id: i64,
        relative_path: &str,
        status: SyncStatus,
    ) -> Result<()> {
        self.conn().execute(
            "UPDATE file_states SET sync_status = ?1, updated_at = ?2
             WHERE folder_id = ?3 AND relative_path = ?4",
            params![status.as_str(), unix_millis_now(), folder_id, relative_path],
        )?;
        Ok(())
    }

    /// Count of rows per status for one folder, used by the status command.
    pub fn count_file_states(&self, folder_id: i64, status: SyncStatus) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM file_states WHERE folder_id = ?1 AND sync_status = ?2",
            params![folder_id, status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

const STATE_COLUMNS: &str = "id, folder_id, relative_path, local_hash, remote_hash,
    local_mtime, remote_mtime, local_size, remote_size, sync_status,
    last_synced_at, created_at, updated_at";

fn parse_state(row: &Row<'_>) -> rusqlite::Result<Result<FileState>> {
    let status: String = row.get(9)?;
    Ok((|| {
        Ok(FileState {
            id: row.get(0)?,
            folder_id: row.get(1)?,
            relative_path: row.get(2)?,
            local_hash: row.get(3)?,
            remote_hash: row.get(4)?,
            local_mtime: row.get(5)?,
            remote_mtime: row.get(6)?,
            local_size: row.get(7)?,
            remote_size: row.get(8)?,
            sync_status: status.parse()?,
            last_synced_at: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    })())
}
