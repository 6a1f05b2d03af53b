//! Durable priority-FIFO work queue

use std::time::Duration;

use rusqlite::{params, Row};

use crate::error::Result;
use crate::models::{QueueEntry, QueueOp, QueueStatus};
use crate::util::unix_millis_now;

use super::StateStore;

/// Fields accepted when enqueuing a unit of work.
#[derive(Debug, Clone)]
pub struct NewQueueEntry {
    pub folder_id: i64,
    pub relative_path: String,
    pub op: QueueOp,
    pub priority: i64,
    pub max_attempts: i64,
}

impl StateStore {
    /// Enqueue a reconciliation unit.
    ///
    /// Idempotent against the live entry for the same `(folder, path)`:
    /// a pending entry is coalesced (op replaced with the newer intent,
    /// priority bumped to the max); a processing entry is returned as-is so
    /// the one-live-entry-per-path invariant holds. Returns the entry id.
    pub fn enqueue(&self, new: &NewQueueEntry) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT id, priority, status FROM sync_queue
                 WHERE folder_id = ?1 AND relative_path = ?2
                   AND status IN ('pending', 'processing')
                 LIMIT 1",
                params![new.folder_id, new.relative_path],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let id = match existing {
            Some((id, _, status)) if status == QueueStatus::Processing.as_str() => id,
            Some((id, priority, _)) => {
                tx.execute(
                    "UPDATE sync_queue SET op = ?1, priority = ?2 WHERE id = ?3",
                    params![new.op.as_str(), priority.max(new.priority), id],
                )?;
                id
            }
            None => {
                // The new entry supersedes any failed-but-retryable one for
                // this path; retrying a stale op after newer work would be
                // wrong (a dead delete must not fire after a re-create).
                tx.execute(
                    "UPDATE sync_queue SET attempts = max_attempts
                     WHERE folder_id = ?1 AND relative_path = ?2
                       AND status = 'failed' AND attempts < max_attempts",
                    params![new.folder_id, new.relative_path],
                )?;
                tx.execute(
                    "INSERT INTO sync_queue (
                        folder_id, relative_path, op, priority, max_attempts, created_at
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        new.folder_id,
                        new.relative_path,
                        new.op.as_str(),
                        new.priority,
                        new.max_attempts,
                        unix_millis_now(),
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()?;
        Ok(id)
    }

    /// Atomically claim the next unit of work.
    ///
    /// Selects the oldest pending entry with the highest priority whose
    /// attempts are not exhausted, flips it to processing, consumes an
    /// attempt, and stamps `started_at`. Returns `None` on an empty queue.
    pub fn dequeue(&self) -> Result<Option<QueueEntry>> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let entry = tx
            .query_row(
                &format!(
                    "SELECT {QUEUE_COLUMNS} FROM sync_queue
                     WHERE status = 'pending' AND attempts < max_attempts
                     ORDER BY priority DESC, created_at ASC, id ASC
                     LIMIT 1"
                ),
                [],
                parse_entry,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let Some(entry) = entry else {
            return Ok(None);
        };
        let mut entry = entry?;

        let now = unix_millis_now();
        // Compare-and-set on status: the row must still be pending.
        let claimed = tx.execute(
            "UPDATE sync_queue
             SET status = 'processing', attempts = attempts + 1, started_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now, entry.id],
        )?;
        if claimed == 0 {
            return Ok(None);
        }
        tx.commit()?;

        entry.status = QueueStatus::Processing;
        entry.attempts += 1;
        entry.started_at = Some(now);
        Ok(Some(entry))
    }

    /// Transition a processing entry to its terminal state.
    pub fn complete(&self, id: i64, success: bool, error_message: Option<&str>) -> Result<()> {
        let status = if success {
            QueueStatus::Completed
        } else {
            QueueStatus::Failed
        };
        self.conn().execute(
            "UPDATE sync_queue SET status = ?1, error_message = ?2, completed_at = ?3
             WHERE id = ?4 AND status = 'processing'",
            params![status.as_str(), error_message, unix_millis_now(), id],
        )?;
        Ok(())
    }

    /// Fail an entry permanently: no retry pass will pick it up again.
    pub fn complete_permanent(&self, id: i64, error_message: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE sync_queue
             SET status = 'failed', error_message = ?1, completed_at = ?2,
                 attempts = max_attempts
             WHERE id = ?3 AND status = 'processing'",
            params![error_message, unix_millis_now(), id],
        )?;
        Ok(())
    }

    /// Fail an entry as cancelled, refunding the consumed attempt.
    pub fn complete_cancelled(&self, id: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE sync_queue
             SET status = 'failed', error_message = 'cancelled', completed_at = ?1,
                 attempts = MAX(attempts - 1, 0)
             WHERE id = ?2 AND status = 'processing'",
            params![unix_millis_now(), id],
        )?;
        Ok(())
    }

    /// Count of pending entries.
    pub fn queue_size(&self) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending'",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Pending entries for one folder.
    pub fn queue_size_for_folder(&self, folder_id: i64) -> Result<i64> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM sync_queue WHERE status = 'pending' AND folder_id = ?1",
            [folder_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Entries that failed with no attempts left.
    pub fn terminal_failed_count(&self, folder_id: Option<i64>) -> Result<i64> {
        let conn = self.conn();
        let count = match folder_id {
            Some(folder_id) => conn.query_row(
                "SELECT COUNT(*) FROM sync_queue
                 WHERE status = 'failed' AND attempts >= max_attempts AND folder_id = ?1",
                [folder_id],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM sync_queue
                 WHERE status = 'failed' AND attempts >= max_attempts",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(count)
    }

    /// Delete terminal entries past the age threshold.
    pub fn gc_queue(&self, older_than: Duration) -> Result<usize> {
        let cutoff = unix_millis_now() - older_than.as_millis() as i64;
        let removed = self.conn().execute(
            "DELETE FROM sync_queue
             WHERE status IN ('completed', 'failed') AND completed_at < ?1",
            [cutoff],
        )?;
        Ok(removed)
    }

    /// Reset processing entries stranded by a crash back to pending.
    ///
    /// Only entries whose `started_at` is older than the grace period are
    /// touched, so work legitimately in flight on a live daemon is left
    /// alone. The consumed attempt is refunded.
    pub fn recover_stale(&self, grace: Duration) -> Result<usize> {
        let cutoff = unix_millis_now() - grace.as_millis() as i64;
        let recovered = self.conn().execute(
            "UPDATE sync_queue
             SET status = 'pending', attempts = MAX(attempts - 1, 0), started_at = NULL
             WHERE status = 'processing' AND started_at < ?1",
            [cutoff],
        )?;
        Ok(recovered)
    }

    /// Re-enqueue failed entries whose exponential backoff has elapsed.
    ///
    /// The delay for an entry on attempt `n` is `base * 2^(n-1)`, clamped to
    /// `max_delay`. Returns the number of entries made runnable.
    pub fn requeue_failed(&self, base_delay: Duration, max_delay: Duration) -> Result<usize> {
        let now = unix_millis_now();
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let candidates: Vec<(i64, i64, i64)> = {
            // Skip paths that already have a live entry again: flipping the
            // old row back would break the one-live-entry-per-path invariant.
            let mut stmt = tx.prepare(
                "SELECT id, attempts, completed_at FROM sync_queue AS q
                 WHERE status = 'failed' AND attempts < max_attempts
                   AND completed_at IS NOT NULL
                   AND NOT EXISTS (
                       SELECT 1 FROM sync_queue AS live
                       WHERE live.folder_id = q.folder_id
                         AND live.relative_path = q.relative_path
                         AND live.status IN ('pending', 'processing')
                   )",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        let mut requeued = 0;
        for (id, attempts, completed_at) in candidates {
            let delay = backoff_delay(base_delay, max_delay, attempts);
            if completed_at + delay.as_millis() as i64 <= now {
                tx.execute(
                    "UPDATE sync_queue
                     SET status = 'pending', started_at = NULL, completed_at = NULL
                     WHERE id = ?1 AND status = 'failed'",
                    [id],
                )?;
                requeued += 1;
            }
        }

        tx.commit()?;
        Ok(requeued)
    }
}

/// Backoff before retrying an entry that has consumed `attempts` attempts.
pub fn backoff_delay(base: Duration, max: Duration, attempts: i64) -> Duration {
    let shift = attempts.saturating_sub(1).clamp(0, 20) as u32;
    base.saturating_mul(1 << shift).min(max)
}

const QUEUE_COLUMNS: &str = "id, folder_id, relative_path, op, priority, attempts,
    max_attempts, status, error_message, created_at, started_at, completed_at";

fn parse_entry(row: &Row<'_>) -> rusqlite::Result<Result<QueueEntry>> {
    let op: String = row.get(3)?;
    let status: String = row.get(7)?;
    Ok((|| {
        Ok(QueueEntry {
            id: row.get(0)?,
            folder_id: row.get(1)?,
            relative_path: row.get(2)?,
            op: op.parse()?,
            priority: row.get(4)?,
            attempts: row.get(5)?,
            max_attempts: row.get(6)?,
            status: status.parse()?,
            error_message: row.get(8)?,
            created_at: row.get(9)?,
            started_at: row.get(10)?,
            completed_at: row.get(11)?,
        })
    })())
}

#[cfg(test)]
mod tests {
    use super::super::folders::tests::sample_folder;
    use super::*;

    fn store_with_folder() -> (StateStore, i64) {
        let store = StateStore::open_in_memory().unwrap();
        let folder = store.create_folder(&sample_folder("/tmp/a")).unwrap();
        (store, folder.id)
    }

    fn unit(folder_id: i64, path: &str, op: QueueOp, priority: i64) -> NewQueueEntry {
        NewQueueEntry {
            folder_id,
            relative_path: path.to_string(),
            op,
            priority,
            max_attempts: 3,
        }
    }

    #[test]
    fn dequeue_orders_by_priority_then_age() {
        let (store, f) = store_with_folder();
        store.enqueue(&unit(f, "low.txt", QueueOp::Upload, 0)).unwrap();
        store.enqueue(&unit(f, "high.txt", QueueOp::Upload, 5)).unwrap();
        store.enqueue(&unit(f, "low2.txt", QueueOp::Upload, 0)).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| {
            store.dequeue().unwrap().map(|e| e.relative_path)
        })
        .collect();
        assert_eq!(order, vec!["high.txt", "low.txt", "low2.txt"]);
    }

    #[test]
    fn enqueue_coalesces_pending_entry() {
        let (store, f) = store_with_folder();
        let first = store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 1)).unwrap();
        let second = store
            .enqueue(&unit(f, "x.txt", QueueOp::DeleteRemote, 0))
            .unwrap();
        assert_eq!(first, second);

        let entry = store.dequeue().unwrap().unwrap();
        // Newer intent wins, priority keeps the max.
        assert_eq!(entry.op, QueueOp::DeleteRemote);
        assert_eq!(entry.priority, 1);
        assert_eq!(store.queue_size().unwrap(), 0);
    }

    #[test]
    fn enqueue_during_processing_does_not_add_second_live_row() {
        let (store, f) = store_with_folder();
        let id = store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();
        let claimed = store.dequeue().unwrap().unwrap();
        assert_eq!(claimed.id, id);

        let again = store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();
        assert_eq!(again, id);

        let live: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sync_queue
                 WHERE relative_path = 'x.txt' AND status IN ('pending', 'processing')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(live, 1);
    }

    #[test]
    fn dequeue_consumes_attempt_and_stamps_start() {
        let (store, f) = store_with_folder();
        store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();

        let entry = store.dequeue().unwrap().unwrap();
        assert_eq!(entry.status, QueueStatus::Processing);
        assert_eq!(entry.attempts, 1);
        assert!(entry.started_at.is_some());

        // Nothing else to claim while the entry is in flight.
        assert!(store.dequeue().unwrap().is_none());
    }

    #[test]
    fn complete_transitions_to_terminal() {
        let (store, f) = store_with_folder();
        store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();
        let entry = store.dequeue().unwrap().unwrap();

        store.complete(entry.id, false, Some("boom")).unwrap();
        let status: String = store
            .conn()
            .query_row("SELECT status FROM sync_queue WHERE id = ?1", [entry.id], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(status, "failed");
    }

    #[test]
    fn exhausted_entries_are_not_dequeued() {
        let (store, f) = store_with_folder();
        let mut new = unit(f, "x.txt", QueueOp::Upload, 0);
        new.max_attempts = 1;
        store.enqueue(&new).unwrap();

        let entry = store.dequeue().unwrap().unwrap();
        store.complete(entry.id, false, Some("transient")).unwrap();
        store
            .requeue_failed(Duration::ZERO, Duration::from_secs(60))
            .unwrap();

        assert!(store.dequeue().unwrap().is_none());
        assert_eq!(store.terminal_failed_count(Some(f)).unwrap(), 1);
    }

    #[test]
    fn requeue_failed_respects_backoff() {
        let (store, f) = store_with_folder();
        store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();
        let entry = store.dequeue().unwrap().unwrap();
        store.complete(entry.id, false, Some("transient")).unwrap();

        // Backoff window still open: nothing to requeue.
        let requeued = store
            .requeue_failed(Duration::from_secs(3600), Duration::from_secs(7200))
            .unwrap();
        assert_eq!(requeued, 0);

        // Zero backoff: entry becomes runnable again.
        let requeued = store
            .requeue_failed(Duration::ZERO, Duration::from_secs(60))
            .unwrap();
        assert_eq!(requeued, 1);
        let entry = store.dequeue().unwrap().unwrap();
        assert_eq!(entry.attempts, 2);
    }

    #[test]
    fn requeue_skips_paths_with_a_newer_live_entry() {
        let (store, f) = store_with_folder();
        store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();
        let entry = store.dequeue().unwrap().unwrap();
        store.complete(entry.id, false, Some("transient")).unwrap();

        // The watcher enqueued a fresh unit for the same path meanwhile.
        store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();

        let requeued = store
            .requeue_failed(Duration::ZERO, Duration::from_secs(60))
            .unwrap();
        assert_eq!(requeued, 0);

        let live: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM sync_queue
                 WHERE relative_path = 'x.txt' AND status IN ('pending', 'processing')",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(live, 1);
    }

    #[test]
    fn cancelled_entries_refund_the_attempt() {
        let (store, f) = store_with_folder();
        store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();
        let entry = store.dequeue().unwrap().unwrap();
        store.complete_cancelled(entry.id).unwrap();

        let attempts: i64 = store
            .conn()
            .query_row("SELECT attempts FROM sync_queue WHERE id = ?1", [entry.id], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(attempts, 0);
    }

    #[test]
    fn recover_stale_resets_old_processing_rows() {
        let (store, f) = store_with_folder();
        store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();
        let entry = store.dequeue().unwrap().unwrap();

        // Backdate started_at past the grace period.
        store
            .conn()
            .execute(
                "UPDATE sync_queue SET started_at = started_at - 120000 WHERE id = ?1",
                [entry.id],
            )
            .unwrap();

        let recovered = store.recover_stale(Duration::from_secs(60)).unwrap();
        assert_eq!(recovered, 1);

        let entry = store.dequeue().unwrap().unwrap();
        assert_eq!(entry.attempts, 1);
    }

    #[test]
    fn recover_stale_leaves_fresh_processing_alone() {
        let (store, f) = store_with_folder();
        store.enqueue(&unit(f, "x.txt", QueueOp::Upload, 0)).unwrap();
        store.dequeue().unwrap().unwrap();

        let recovered = store.recover_stale(Duration::from_secs(60)).unwrap();
        assert_eq!(recovered, 0);
    }

    #[test]
    fn gc_removes_only_old_terminal_entries() {
        let (store, f) = store_with_folder();
        store.enqueue(&unit(f, "old.txt", QueueOp::Upload, 0)).unwrap();
        let old = store.dequeue().unwrap().unwrap();
        store.complete(old.id, true, None).unwrap();
        store
            .conn()
            .execute(
                "UPDATE sync_queue SET completed_at = completed_at - 600000 WHERE id = ?1",
                [old.id],
            )
            .unwrap();

        store.enqueue(&unit(f, "new.txt", QueueOp::Upload, 0)).unwrap();

        let removed = store.gc_queue(Duration::from_secs(300)).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.queue_size().unwrap(), 1);
    }

    #[test]
    fn backoff_doubles_and_clamps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(60);
        assert_eq!(backoff_delay(base, max, 1), Duration::from_secs(5));
        assert_eq!(backoff_delay(base, max, 2), Duration::from_secs(10));
        assert_eq!(backoff_delay(base, max, 3), Duration::from_secs(20));
        assert_eq!(backoff_delay(base, max, 10), max);
    }
}
