//! Conflict repository

use rusqlite::{params, Row};

use crate::error::{Error, Result};
use crate::models::{Conflict, ConflictChoice, FileState};
use crate::util::unix_millis_now;

use super::StateStore;

impl StateStore {
    /// Record a divergence for `(folder, path)`.
    ///
    /// An existing unresolved row for the same path is refreshed in place so
    /// repeated reconciles during an open conflict don't pile up duplicates.
    pub fn record_conflict(&self, state: &FileState) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT id FROM conflicts
                 WHERE folder_id = ?1 AND relative_path = ?2 AND resolved = 0",
                params![state.folder_id, state.relative_path],
                |row| row.get::<_, i64>(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE conflicts SET local_hash = ?1, remote_hash = ?2,
                        local_mtime = ?3, remote_mtime = ?4
                     WHERE id = ?5",
                    params![
                        state.local_hash,
                        state.remote_hash,
                        state.local_mtime,
                        state.remote_mtime,
                        id,
                    ],
                )?;
                id
            }
            None => {
                tx.execute(
                    "INSERT INTO conflicts (
                        folder_id, relative_path, local_hash, remote_hash,
                        local_mtime, remote_mtime, created_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        state.folder_id,
                        state.relative_path,
                        state.local_hash,
                        state.remote_hash,
                        state.local_mtime,
                        state.remote_mtime,
                        unix_millis_now(),
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()?;
        Ok(id)
    }

    /// Fetch one conflict by id.
    pub fn get_conflict(&self, id: i64) -> Result<Option<Conflict>> {
        let conn = self.conn();
        let result = conn.query_row(
            &format!("SELECT {CONFLICT_COLUMNS} FROM conflicts WHERE id = ?1"),
            [id],
            parse_conflict,
        );
        match result {
            Ok(conflict) => Ok(Some(conflict?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Unresolved conflicts, newest first, optionally scoped to one folder.
    pub fn unresolved_conflicts(&self, folder_id: Option<i64>) -> Result<Vec<Conflict>> {
        let conn = self.conn();
        let rows = match folder_id {
            Some(folder_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONFLICT_COLUMNS} FROM conflicts
                     WHERE resolved = 0 AND folder_id = ?1
                     ORDER BY created_at DESC, id DESC"
                ))?;
                let result = stmt
                    .query_map([folder_id], parse_conflict)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CONFLICT_COLUMNS} FROM conflicts
                     WHERE resolved = 0 ORDER BY created_at DESC, id DESC"
                ))?;
                let result = stmt
                    .query_map([], parse_conflict)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
        };
        rows.into_iter().collect()
    }

    /// Count of unresolved conflicts.
    pub fn unresolved_conflict_count(&self) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM conflicts WHERE resolved = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Mark a conflict resolved with the given choice.
    pub fn resolve_conflict(&self, id: i64, choice: ConflictChoice) -> Result<Conflict> {
        let rows = self.conn().execute(
            "UPDATE conflicts SET resolution = ?1, resolved = 1, resolved_at = ?2
             WHERE id = ?3 AND resolved = 0",
            params![choice.as_str(), unix_millis_now(), id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(format!("unresolved conflict {id}")));
        }
        self.get_conflict(id)?
            .ok_or_else(|| Error::NotFound(format!("conflict {id}")))
    }
}

const CONFLICT_COLUMNS: &str = "id, folder_id, relative_path, local_hash, remote_hash,
    local_mtime, remote_mtime, resolution, resolved, created_at, resolved_at";

fn parse_conflict(row: &Row<'_>) -> rusqlite::Result<Result<Conflict>> {
    let resolution: Option<String> = row.get(7)?;
    Ok((|| {
        Ok(Conflict {
            id: row.get(0)?,
            folder_id: row.get(1)?,
            relative_path: row.get(2)?,
            local_hash: row.get(3)?,
            remote_hash: row.get(4)?,
            local_mtime: row.get(5)?,
            remote_mtime: row.get(6)?,
            resolution: resolution.map(|r| r.parse()).transpose()?,
            resolved: row.get(8)?,
            created_at: row.get(9)?,
            resolved_at: row.get(10)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::super::folders::tests::sample_folder;
    use super::*;

    fn conflicted_state(folder_id: i64, path: &str) -> FileState {
        let mut state = FileState::pending(folder_id, path);
        state.local_hash = Some("h1".to_string());
        state.remote_hash = Some("h2".to_string());
        state
    }

    #[test]
    fn record_then_resolve() {
        let store = StateStore::open_in_memory().unwrap();
        let folder = store.create_folder(&sample_folder("/tmp/a")).unwrap();

        let id = store
            .record_conflict(&conflicted_state(folder.id, "x.txt"))
            .unwrap();
        assert_eq!(store.unresolved_conflict_count().unwrap(), 1);

        let resolved = store.resolve_conflict(id, ConflictChoice::KeepLocal).unwrap();
        assert!(resolved.resolved);
        assert_eq!(resolved.resolution, Some(ConflictChoice::KeepLocal));
        assert!(resolved.resolved_at.is_some());
        assert_eq!(store.unresolved_conflict_count().unwrap(), 0);
    }

    #[test]
    fn repeated_reconcile_refreshes_open_conflict() {
        let store = StateStore::open_in_memory().unwrap();
        let folder = store.create_folder(&sample_folder("/tmp/a")).unwrap();

        let first = store
            .record_conflict(&conflicted_state(folder.id, "x.txt"))
            .unwrap();
        let mut newer = conflicted_state(folder.id, "x.txt");
        newer.remote_hash = Some("h3".to_string());
        let second = store.record_conflict(&newer).unwrap();

        assert_eq!(first, second);
        let conflicts = store.unresolved_conflicts(None).unwrap();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].remote_hash.as_deref(), Some("h3"));
    }

    #[test]
    fn resolving_twice_fails() {
        let store = StateStore::open_in_memory().unwrap();
        let folder = store.create_folder(&sample_folder("/tmp/a")).unwrap();
        let id = store
            .record_conflict(&conflicted_state(folder.id, "x.txt"))
            .unwrap();

        store.resolve_conflict(id, ConflictChoice::KeepRemote).unwrap();
        assert!(matches!(
            store.resolve_conflict(id, ConflictChoice::KeepLocal),
            Err(Error::NotFound(_))
        ));
    }
}
