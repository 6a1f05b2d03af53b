//! Activity log repository

use std::time::Duration;

use rusqlite::{params, Row};

use crate::error::Result;
use crate::models::{Activity, ActivityStatus};
use crate::util::unix_millis_now;

use super::StateStore;

/// Fields recorded for one unit-of-work outcome.
#[derive(Debug, Clone)]
pub struct NewActivity {
    pub folder_id: Option<i64>,
    pub operation: String,
    pub path: String,
    pub status: ActivityStatus,
    pub details: Option<String>,
    pub error_message: Option<String>,
    pub bytes_transferred: Option<i64>,
    pub duration_ms: Option<i64>,
}

impl StateStore {
    /// Append one activity entry.
    pub fn log_activity(&self, activity: &NewActivity) -> Result<i64> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO activity_log (
                folder_id, operation, path, status, details,
                error_message, bytes_transferred, duration_ms, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                activity.folder_id,
                activity.operation,
                activity.path,
                activity.status.as_str(),
                activity.details,
                activity.error_message,
                activity.bytes_transferred,
                activity.duration_ms,
                unix_millis_now(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Most recent entries, newest first, optionally scoped to one folder.
    pub fn recent_activity(&self, limit: usize, folder_id: Option<i64>) -> Result<Vec<Activity>> {
        let conn = self.conn();
        let rows = match folder_id {
            Some(folder_id) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM activity_log
                     WHERE folder_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2"
                ))?;
                let result = stmt
                    .query_map(params![folder_id, limit as i64], parse_activity)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ACTIVITY_COLUMNS} FROM activity_log
                     ORDER BY created_at DESC, id DESC LIMIT ?1"
                ))?;
                let result = stmt
                    .query_map([limit as i64], parse_activity)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                result
            }
        };
        rows.into_iter().collect()
    }

    /// Delete entries past the retention window.
    pub fn gc_activity(&self, retention: Duration) -> Result<usize> {
        let cutoff = unix_millis_now() - retention.as_millis() as i64;
        let removed = self
            .conn()
            .execute("DELETE FROM activity_log WHERE created_at < ?1", [cutoff])?;
        Ok(removed)
    }
}

const ACTIVITY_COLUMNS: &str = "id, folder_id, operation, path, status, details,
    error_message, bytes_transferred, duration_ms, created_at";

fn parse_activity(row: &Row<'_>) -> rusqlite::Result<Result<Activity>> {
    let status: String = row.get(4)?;
    Ok((|| {
        Ok(Activity {
            id: row.get(0)?,
            folder_id: row.get(1)?,
            operation: row.get(2)?,
            path: row.get(3)?,
            status: status.parse()?,
            details: row.get(5)?,
            error_message: row.get(6)?,
            bytes_transferred: row.get(7)?,
            duration_ms: row.get(8)?,
            created_at: row.get(9)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::super::folders::tests::sample_folder;
    use super::*;

    fn entry(folder_id: i64, path: &str, status: ActivityStatus) -> NewActivity {
        NewActivity {
            folder_id: Some(folder_id),
            operation: "upload".to_string(),
            path: path.to_string(),
            status,
            details: None,
            error_message: None,
            bytes_transferred: Some(42),
            duration_ms: Some(7),
        }
    }

    #[test]
    fn recent_returns_newest_first() {
        let store = StateStore::open_in_memory().unwrap();
        let folder = store.create_folder(&sample_folder("/tmp/a")).unwrap();

        for path in ["a.txt", "b.txt", "c.txt"] {
            store
                .log_activity(&entry(folder.id, path, ActivityStatus::Success))
                .unwrap();
        }

        let recent = store.recent_activity(2, None).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].path, "c.txt");
        assert_eq!(recent[1].path, "b.txt");
    }

    #[test]
    fn folder_removal_keeps_activity_without_reference() {
        let store = StateStore::open_in_memory().unwrap();
        let folder = store.create_folder(&sample_folder("/tmp/a")).unwrap();
        store
            .log_activity(&entry(folder.id, "a.txt", ActivityStatus::Failed))
            .unwrap();

        store.delete_folder(folder.id).unwrap();

        let recent = store.recent_activity(10, None).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].folder_id, None);
    }

    #[test]
    fn gc_drops_entries_past_retention() {
        let store = StateStore::open_in_memory().unwrap();
        let folder = store.create_folder(&sample_folder("/tmp/a")).unwrap();
        let id = store
            .log_activity(&entry(folder.id, "old.txt", ActivityStatus::Success))
            .unwrap();
        store
            .conn()
            .execute(
                "UPDATE activity_log SET created_at = created_at - 864000000 WHERE id = ?1",
                [id],
            )
            .unwrap();
        store
            .log_activity(&entry(folder.id, "new.txt", ActivityStatus::Success))
            .unwrap();

        let removed = store.gc_activity(Duration::from_secs(86_400)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.recent_activity(10, None).unwrap().len(), 1);
    }
}
