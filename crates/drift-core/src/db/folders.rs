//! Sync folder repository

use std::path::{Path, PathBuf};

use rusqlite::{params, Row};

use crate::error::{Error, Result};
use crate::models::SyncFolder;
use crate::util::unix_millis_now;

use super::StateStore;

/// Fields accepted when declaring a new sync folder.
#[derive(Debug, Clone)]
pub struct NewFolder {
    pub local_root: PathBuf,
    pub remote_prefix: String,
    pub direction: crate::models::SyncDirection,
    pub conflict_policy: crate::models::ConflictPolicy,
    pub exclude_patterns: Vec<String>,
    pub bandwidth_cap: Option<u64>,
    pub poll_interval: Option<u64>,
}

impl StateStore {
    /// Declare a new sync folder.
    ///
    /// Rejects roots that are a prefix of (or prefixed by) an existing
    /// folder's root: two watchers over nested trees would double-process
    /// every event.
    pub fn create_folder(&self, new: &NewFolder) -> Result<SyncFolder> {
        if !new.local_root.is_absolute() {
            return Err(Error::InvalidInput(format!(
                "local root must be absolute: {}",
                new.local_root.display()
            )));
        }

        for existing in self.list_folders()? {
            if paths_overlap(&existing.local_root, &new.local_root) {
                return Err(Error::FolderOverlap(
                    new.local_root.display().to_string(),
                    existing.local_root.display().to_string(),
                ));
            }
        }

        let now = unix_millis_now();
        let patterns = serde_json::to_string(&new.exclude_patterns)?;
        let conn = self.conn();
        conn.execute(
            "INSERT INTO sync_folders (
                local_root, remote_prefix, direction, enabled, conflict_policy,
                exclude_patterns, bandwidth_cap, poll_interval, created_at, updated_at
             ) VALUES (?1, ?2, ?3, 1, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                new.local_root.to_string_lossy().into_owned(),
                new.remote_prefix,
                new.direction.as_str(),
                new.conflict_policy.as_str(),
                patterns,
                new.bandwidth_cap,
                new.poll_interval,
                now,
            ],
        )?;
        let id = conn.last_insert_rowid();
        drop(conn);

        self.get_folder(id)?
            .ok_or_else(|| Error::NotFound(format!("folder {id}")))
    }

    /// Fetch one folder by id.
    pub fn get_folder(&self, id: i64) -> Result<Option<SyncFolder>> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {FOLDER_COLUMNS} FROM sync_folders WHERE id = ?1"),
            [id],
            parse_folder,
        );
        match result {
            Ok(folder) => Ok(Some(folder?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all folders, oldest first.
    pub fn list_folders(&self) -> Result<Vec<SyncFolder>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("SELECT {FOLDER_COLUMNS} FROM sync_folders ORDER BY id"))?;
        let rows = stmt
            .query_map([], parse_folder)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().collect()
    }

    /// Enable or disable a folder without removing its state.
    pub fn set_folder_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE sync_folders SET enabled = ?1, updated_at = ?2 WHERE id = ?3",
            params![enabled, unix_millis_now(), id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("folder {id}")));
        }
        Ok(())
    }

    /// Remove a folder. File states, queue entries, and conflicts cascade;
    /// activity rows keep their text but lose the folder reference.
    pub fn delete_folder(&self, id: i64) -> Result<()> {
        let rows = self
            .conn()
            .execute("DELETE FROM sync_folders WHERE id = ?1", [id])?;
        if rows == 0 {
            return Err(Error::NotFound(format!("folder {id}")));
        }
        Ok(())
    }
}

const FOLDER_COLUMNS: &str = "id, local_root, remote_prefix, direction, enabled, conflict_policy,
    exclude_patterns, bandwidth_cap, poll_interval, created_at, updated_at";

fn parse_folder(row: &Row<'_>) -> rusqlite::Result<Result<SyncFolder>> {
    let local_root: String = row.get(1)?;
    let direction: String = row.get(3)?;
    let conflict_policy: String = row.get(5)?;
    let patterns: String = row.get(6)?;

    Ok((|| {
        Ok(SyncFolder {
            id: row.get(0)?,
            local_root: PathBuf::from(local_root),
            remote_prefix: row.get(2)?,
            direction: direction.parse()?,
            enabled: row.get(4)?,
            conflict_policy: conflict_policy.parse()?,
            exclude_patterns: serde_json::from_str(&patterns)?,
            bandwidth_cap: row.get(7)?,
            poll_interval: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    })())
}

fn paths_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
