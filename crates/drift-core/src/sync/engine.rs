//! Reconciliation engine
//!
//! Turns observations (from the scanner or the watcher) into file-state
//! updates, queue entries, and conflict records. The engine never performs
//! transfers itself; that's the worker pool's job.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::db::{NewQueueEntry, StateStore};
use crate::error::{Error, Result};
use crate::models::{
    Conflict, ConflictChoice, ConflictPolicy, FileState, QueueOp, SyncFolder, SyncStatus,
};
use crate::remote::{RemoteObject, RemoteStore};
use crate::sync::excludes::ExcludeRules;
use crate::sync::hasher::hash_file;
use crate::sync::reconciler::{apply_direction, decide, LocalObservation, SyncAction};
use crate::sync::FsEvent;
use crate::util::{local_path, relative_key, remote_key, unix_millis_now};

/// Queue priority for entries produced by a full scan.
const SCAN_PRIORITY: i64 = 0;
/// Watcher events jump ahead of scan backlog.
const EVENT_PRIORITY: i64 = 1;
/// Conflict resolutions jump ahead of everything.
const RESOLVE_PRIORITY: i64 = 2;

/// Outcome counts for one folder scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    pub scanned: usize,
    pub enqueued: usize,
    pub conflicts: usize,
    pub errors: usize,
}

/// Computes desired actions from `(local, remote, baseline)` and records
/// them in the state store.
pub struct SyncEngine {
    store: Arc<StateStore>,
    remote: Arc<dyn RemoteStore>,
    max_attempts: i64,
}

impl SyncEngine {
    pub fn new(store: Arc<StateStore>, remote: Arc<dyn RemoteStore>, max_attempts: i64) -> Self {
        Self {
            store,
            remote,
            max_attempts,
        }
    }

    /// Handle one debounced filesystem event.
    ///
    /// Observes the local side, stats the single remote object, and
    /// reconciles. A `create` immediately followed by `delete` within the
    /// debounce window arrives here with nothing on disk and, with no synced
    /// baseline, produces nothing.
    pub async fn process_event(&self, folder: &SyncFolder, event: &FsEvent) -> Result<()> {
        let excludes = ExcludeRules::new(&folder.exclude_patterns)?;
        let rel = relative_key(&folder.local_root, &event.path)?;
        if excludes.is_excluded(&rel) {
            return Ok(());
        }

        debug!(
            folder = folder.id,
            path = %rel,
            kind = event.kind.as_str(),
            "processing filesystem event"
        );

        let local = observe_local(&event.path)?;
        let remote = self
            .remote
            .stat(&remote_key(&folder.remote_prefix, &rel))
            .await?;

        self.reconcile_path(folder, &rel, local.as_ref(), remote.as_ref(), EVENT_PRIORITY)
            .await?;
        Ok(())
    }

    /// Full scan of a folder: every non-excluded regular file, every remote
    /// object under the prefix, and every baseline row are reconciled.
    ///
    /// Running a scan twice back-to-back with no changes enqueues nothing
    /// the second time.
    pub async fn scan_folder(&self, folder: &SyncFolder) -> Result<ScanSummary> {
        let excludes = ExcludeRules::new(&folder.exclude_patterns)?;
        let mut summary = ScanSummary::default();

        // Local tree.
        let mut local: HashMap<String, LocalObservation> = HashMap::new();
        collect_local_files(
            &folder.local_root,
            &folder.local_root,
            &excludes,
            &mut local,
            &mut summary.errors,
        );

        // Remote listing, keyed by path relative to the prefix.
        let prefix = if folder.remote_prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", folder.remote_prefix.trim_end_matches('/'))
        };
        let mut remote: HashMap<String, RemoteObject> = HashMap::new();
        for object in self.remote.list(&prefix).await? {
            let rel = object
                .key
                .strip_prefix(&prefix)
                .unwrap_or(&object.key)
                .to_string();
            if !excludes.is_excluded(&rel) {
                remote.insert(rel, object);
            }
        }

        // Union of every path either side or the baseline knows about.
        let mut paths: Vec<String> = local.keys().cloned().collect();
        for key in remote.keys() {
            if !local.contains_key(key) {
                paths.push(key.clone());
            }
        }
        for state in self.store.list_file_states(folder.id, None)? {
            if !local.contains_key(&state.relative_path)
                && !remote.contains_key(&state.relative_path)
            {
                paths.push(state.relative_path);
            }
        }

        for rel in paths {
            summary.scanned += 1;
            let action = self
                .reconcile_path(
                    folder,
                    &rel,
                    local.get(&rel),
                    remote.get(&rel),
                    SCAN_PRIORITY,
                )
                .await;
            match action {
                Ok(SyncAction::None) => {}
                Ok(SyncAction::Conflict) => summary.conflicts += 1,
                Ok(_) => summary.enqueued += 1,
                Err(e) => {
                    warn!(folder = folder.id, path = %rel, error = %e, "scan reconcile failed");
                    summary.errors += 1;
                }
            }
        }

        debug!(
            folder = folder.id,
            scanned = summary.scanned,
            enqueued = summary.enqueued,
            conflicts = summary.conflicts,
            "folder scan complete"
        );
        Ok(summary)
    }

    /// Reconcile one path and record the outcome. Returns the action taken.
    pub async fn reconcile_path(
        &self,
        folder: &SyncFolder,
        rel: &str,
        local: Option<&LocalObservation>,
        remote: Option<&RemoteObject>,
        priority: i64,
    ) -> Result<SyncAction> {
        let baseline = self.store.file_state(folder.id, rel)?;
        let action = apply_direction(
            decide(local, remote, baseline.as_ref()),
            folder.direction,
        );

        match action {
            SyncAction::None => {
                match (local, remote) {
                    (Some(local), Some(remote)) if local.hash == remote.etag => {
                        // Both sides agree: refresh the synced baseline.
                        self.store.upsert_file_state(&FileState {
                            sync_status: SyncStatus::Synced,
                            local_hash: Some(local.hash.clone()),
                            remote_hash: Some(remote.etag.clone()),
                            local_mtime: Some(local.mtime),
                            remote_mtime: remote.mtime,
                            local_size: Some(local.size),
                            remote_size: Some(remote.size as i64),
                            last_synced_at: Some(unix_millis_now()),
                            ..FileState::pending(folder.id, rel)
                        })?;
                    }
                    (None, None) => {
                        if baseline.is_some() {
                            self.store.delete_file_state(folder.id, rel)?;
                        }
                    }
                    _ => {}
                }
            }
            SyncAction::Conflict => {
                let state = self.store.upsert_file_state(&FileState {
                    sync_status: SyncStatus::Conflict,
                    local_hash: local.map(|l| l.hash.clone()),
                    remote_hash: remote.map(|r| r.etag.clone()),
                    local_mtime: local.map(|l| l.mtime),
                    remote_mtime: remote.and_then(|r| r.mtime),
                    local_size: local.map(|l| l.size),
                    remote_size: remote.map(|r| r.size as i64),
                    last_synced_at: baseline.as_ref().and_then(|b| b.last_synced_at),
                    ..FileState::pending(folder.id, rel)
                })?;
                let conflict_id = self.store.record_conflict(&state)?;

                match folder.conflict_policy {
                    ConflictPolicy::Ask => {
                        debug!(folder = folder.id, path = %rel, "conflict awaiting resolution");
                    }
                    policy => {
                        let choice = match policy {
                            ConflictPolicy::KeepLocal => ConflictChoice::KeepLocal,
                            ConflictPolicy::KeepRemote => ConflictChoice::KeepRemote,
                            ConflictPolicy::KeepBoth => ConflictChoice::KeepBoth,
                            ConflictPolicy::Ask => unreachable!(),
                        };
                        self.resolve_conflict(conflict_id, choice).await?;
                    }
                }
            }
            transfer => {
                let op = match transfer {
                    SyncAction::Upload => QueueOp::Upload,
                    SyncAction::Download => QueueOp::Download,
                    SyncAction::DeleteRemote => QueueOp::DeleteRemote,
                    SyncAction::DeleteLocal => QueueOp::DeleteLocal,
                    SyncAction::None | SyncAction::Conflict => unreachable!(),
                };
                self.store.upsert_file_state(&FileState {
                    sync_status: SyncStatus::Pending,
                    local_hash: local.map(|l| l.hash.clone()),
                    remote_hash: remote.map(|r| r.etag.clone()),
                    local_mtime: local.map(|l| l.mtime),
                    remote_mtime: remote.and_then(|r| r.mtime),
                    local_size: local.map(|l| l.size),
                    remote_size: remote.map(|r| r.size as i64),
                    last_synced_at: baseline.as_ref().and_then(|b| b.last_synced_at),
                    ..FileState::pending(folder.id, rel)
                })?;
                self.store.enqueue(&NewQueueEntry {
                    folder_id: folder.id,
                    relative_path: rel.to_string(),
                    op,
                    priority,
                    max_attempts: self.max_attempts,
                })?;
            }
        }

        Ok(action)
    }

    /// Settle a recorded conflict with the given choice and queue the
    /// transfer that enforces it.
    pub async fn resolve_conflict(
        &self,
        conflict_id: i64,
        choice: ConflictChoice,
    ) -> Result<Conflict> {
        let conflict = self
            .store
            .get_conflict(conflict_id)?
            .ok_or_else(|| Error::NotFound(format!("conflict {conflict_id}")))?;
        let folder = self
            .store
            .get_folder(conflict.folder_id)?
            .ok_or_else(|| Error::NotFound(format!("folder {}", conflict.folder_id)))?;

        let resolved = self.store.resolve_conflict(conflict_id, choice)?;

        match choice {
            ConflictChoice::KeepLocal => {
                self.enqueue_resolution(&folder, &conflict.relative_path, QueueOp::Upload)?;
            }
            ConflictChoice::KeepRemote => {
                self.enqueue_resolution(&folder, &conflict.relative_path, QueueOp::Download)?;
            }
            ConflictChoice::KeepBoth => {
                // Park the local version under a conflict-copy name, then let
                // both files sync: the copy uploads, the original re-downloads.
                let source = local_path(&folder.local_root, &conflict.relative_path);
                let copy_rel = conflict_copy_name(&conflict.relative_path);
                if source.exists() {
                    let copy_path = local_path(&folder.local_root, &copy_rel);
                    std::fs::copy(&source, &copy_path)?;
                    self.enqueue_resolution(&folder, &copy_rel, QueueOp::Upload)?;
                }
                self.enqueue_resolution(&folder, &conflict.relative_path, QueueOp::Download)?;
            }
        }

        self.store
            .set_sync_status(folder.id, &conflict.relative_path, SyncStatus::Pending)?;
        Ok(resolved)
    }

    fn enqueue_resolution(&self, folder: &SyncFolder, rel: &str, op: QueueOp) -> Result<()> {
        self.store.enqueue(&NewQueueEntry {
            folder_id: folder.id,
            relative_path: rel.to_string(),
            op,
            priority: RESOLVE_PRIORITY,
            max_attempts: self.max_attempts,
        })?;
        Ok(())
    }
}

/// Observe the local side of a path: `None` when absent or not a regular
/// file, the content hash and metadata otherwise.
pub fn observe_local(path: &Path) -> Result<Option<LocalObservation>> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !metadata.is_file() {
        return Ok(None);
    }

    let mtime = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis() as i64);

    Ok(Some(LocalObservation {
        hash: hash_file(path)?,
        size: metadata.len() as i64,
        mtime,
    }))
}

/// Conflict-copy name for a path: `docs/x.txt` -> `docs/x.txt.conflict-<ts>`.
fn conflict_copy_name(rel: &str) -> String {
    format!("{rel}.conflict-{}", unix_millis_now() / 1000)
}

fn collect_local_files(
    root: &Path,
    dir: &Path,
    excludes: &ExcludeRules,
    out: &mut HashMap<String, LocalObservation>,
    errors: &mut usize,
) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot read directory during scan");
            *errors += 1;
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "unreadable directory entry");
                *errors += 1;
                continue;
            }
        };
        let path = entry.path();
        let rel = match relative_key(root, &path) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        if excludes.is_excluded(&rel) {
            continue;
        }

        match entry.file_type() {
            Ok(t) if t.is_dir() => collect_local_files(root, &path, excludes, out, errors),
            Ok(t) if t.is_file() => match observe_local(&path) {
                Ok(Some(observation)) => {
                    out.insert(rel, observation);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot hash file during scan");
                    *errors += 1;
                }
            },
            // Symlinks and special files are not synced.
            Ok(_) => {}
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat entry during scan");
                *errors += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewFolder;
    use crate::models::SyncDirection;
    use crate::remote::MemoryRemoteStore;
    use crate::sync::EventKind;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<StateStore>,
        remote: Arc<MemoryRemoteStore>,
        engine: SyncEngine,
        folder: SyncFolder,
    }

    async fn fixture(policy: ConflictPolicy) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemoteStore::new());
        let folder = store
            .create_folder(&NewFolder {
                local_root: dir.path().to_path_buf(),
                remote_prefix: "b".to_string(),
                direction: SyncDirection::Bidirectional,
                conflict_policy: policy,
                exclude_patterns: vec!["*.tmp".to_string()],
                bandwidth_cap: None,
                poll_interval: None,
            })
            .unwrap();
        let engine = SyncEngine::new(store.clone(), remote.clone(), 3);
        Fixture {
            _dir: dir,
            store,
            remote,
            engine,
            folder,
        }
    }

    #[tokio::test]
    async fn scan_enqueues_upload_for_new_local_file() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        std::fs::write(f.folder.local_root.join("x.txt"), b"hello").unwrap();

        let summary = f.engine.scan_folder(&f.folder).await.unwrap();
        assert_eq!(summary.enqueued, 1);

        let entry = f.store.dequeue().unwrap().unwrap();
        assert_eq!(entry.op, QueueOp::Upload);
        assert_eq!(entry.relative_path, "x.txt");

        let state = f.store.file_state(f.folder.id, "x.txt").unwrap().unwrap();
        assert_eq!(state.sync_status, SyncStatus::Pending);
        assert!(state.local_hash.is_some());
    }

    #[tokio::test]
    async fn scan_skips_excluded_files() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        std::fs::write(f.folder.local_root.join("scratch.tmp"), b"junk").unwrap();

        let summary = f.engine.scan_folder(&f.folder).await.unwrap();
        assert_eq!(summary.enqueued, 0);
        assert_eq!(f.store.queue_size().unwrap(), 0);
    }

    #[tokio::test]
    async fn scan_is_idempotent_once_synced() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        std::fs::write(f.folder.local_root.join("x.txt"), b"hello").unwrap();
        f.remote.seed("b/x.txt", b"hello").await;

        let first = f.engine.scan_folder(&f.folder).await.unwrap();
        assert_eq!(first.enqueued, 0);
        let state = f.store.file_state(f.folder.id, "x.txt").unwrap().unwrap();
        assert_eq!(state.sync_status, SyncStatus::Synced);
        assert_eq!(state.local_hash, state.remote_hash);

        let second = f.engine.scan_folder(&f.folder).await.unwrap();
        assert_eq!(second.enqueued, 0);
        assert_eq!(f.store.queue_size().unwrap(), 0);
    }

    #[tokio::test]
    async fn scan_detects_remote_only_objects() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        f.remote.seed("b/fresh.txt", b"from the cloud").await;

        f.engine.scan_folder(&f.folder).await.unwrap();
        let entry = f.store.dequeue().unwrap().unwrap();
        assert_eq!(entry.op, QueueOp::Download);
        assert_eq!(entry.relative_path, "fresh.txt");
    }

    #[tokio::test]
    async fn scan_detects_local_deletion() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        // Baseline says synced, remote still has it, local does not.
        let seeded = f.remote.seed("b/gone.txt", b"v1").await;
        f.store
            .upsert_file_state(&FileState {
                sync_status: SyncStatus::Synced,
                local_hash: Some(seeded.etag.clone()),
                remote_hash: Some(seeded.etag.clone()),
                ..FileState::pending(f.folder.id, "gone.txt")
            })
            .unwrap();

        f.engine.scan_folder(&f.folder).await.unwrap();
        let entry = f.store.dequeue().unwrap().unwrap();
        assert_eq!(entry.op, QueueOp::DeleteRemote);
    }

    #[tokio::test]
    async fn scan_clears_state_rows_for_fully_gone_paths() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        f.store
            .upsert_file_state(&FileState {
                sync_status: SyncStatus::Synced,
                local_hash: Some("h".to_string()),
                remote_hash: Some("h".to_string()),
                ..FileState::pending(f.folder.id, "phantom.txt")
            })
            .unwrap();

        f.engine.scan_folder(&f.folder).await.unwrap();
        assert!(f.store.file_state(f.folder.id, "phantom.txt").unwrap().is_none());
    }

    #[tokio::test]
    async fn conflict_with_ask_policy_waits() {
        let f = fixture(ConflictPolicy::Ask).await;
        std::fs::write(f.folder.local_root.join("x.txt"), b"local edit").unwrap();
        f.remote.seed("b/x.txt", b"remote edit").await;
        // Baseline diverges from both sides.
        f.store
            .upsert_file_state(&FileState {
                sync_status: SyncStatus::Synced,
                local_hash: Some("h0".to_string()),
                remote_hash: Some("h0".to_string()),
                ..FileState::pending(f.folder.id, "x.txt")
            })
            .unwrap();

        let summary = f.engine.scan_folder(&f.folder).await.unwrap();
        assert_eq!(summary.conflicts, 1);
        assert_eq!(f.store.queue_size().unwrap(), 0);

        let state = f.store.file_state(f.folder.id, "x.txt").unwrap().unwrap();
        assert_eq!(state.sync_status, SyncStatus::Conflict);
        assert_eq!(f.store.unresolved_conflict_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn conflict_with_keep_local_policy_uploads() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        std::fs::write(f.folder.local_root.join("x.txt"), b"local edit").unwrap();
        f.remote.seed("b/x.txt", b"remote edit").await;
        f.store
            .upsert_file_state(&FileState {
                sync_status: SyncStatus::Synced,
                local_hash: Some("h0".to_string()),
                remote_hash: Some("h0".to_string()),
                ..FileState::pending(f.folder.id, "x.txt")
            })
            .unwrap();

        f.engine.scan_folder(&f.folder).await.unwrap();

        // Policy resolved the conflict immediately and queued the upload.
        assert_eq!(f.store.unresolved_conflict_count().unwrap(), 0);
        let entry = f.store.dequeue().unwrap().unwrap();
        assert_eq!(entry.op, QueueOp::Upload);
        assert_eq!(entry.priority, RESOLVE_PRIORITY);
    }

    #[tokio::test]
    async fn resolve_keep_both_parks_a_copy() {
        let f = fixture(ConflictPolicy::Ask).await;
        std::fs::write(f.folder.local_root.join("x.txt"), b"local edit").unwrap();
        f.remote.seed("b/x.txt", b"remote edit").await;
        f.store
            .upsert_file_state(&FileState {
                sync_status: SyncStatus::Synced,
                local_hash: Some("h0".to_string()),
                remote_hash: Some("h0".to_string()),
                ..FileState::pending(f.folder.id, "x.txt")
            })
            .unwrap();
        f.engine.scan_folder(&f.folder).await.unwrap();

        let conflict = &f.store.unresolved_conflicts(None).unwrap()[0];
        f.engine
            .resolve_conflict(conflict.id, ConflictChoice::KeepBoth)
            .await
            .unwrap();

        let mut ops = Vec::new();
        while let Some(entry) = f.store.dequeue().unwrap() {
            ops.push((entry.op, entry.relative_path));
        }
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().any(|(op, path)| *op == QueueOp::Upload
            && path.starts_with("x.txt.conflict-")));
        assert!(ops
            .iter()
            .any(|(op, path)| *op == QueueOp::Download && path == "x.txt"));
    }

    #[tokio::test]
    async fn event_reconciles_single_path() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        let path = f.folder.local_root.join("note.md");
        std::fs::write(&path, b"# hi").unwrap();

        f.engine
            .process_event(
                &f.folder,
                &FsEvent {
                    path,
                    kind: EventKind::Create,
                    observed_at: unix_millis_now(),
                },
            )
            .await
            .unwrap();

        let entry = f.store.dequeue().unwrap().unwrap();
        assert_eq!(entry.op, QueueOp::Upload);
        assert_eq!(entry.priority, EVENT_PRIORITY);
    }

    #[tokio::test]
    async fn event_for_excluded_path_is_dropped() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        let path = f.folder.local_root.join("junk.tmp");
        std::fs::write(&path, b"x").unwrap();

        f.engine
            .process_event(
                &f.folder,
                &FsEvent {
                    path,
                    kind: EventKind::Create,
                    observed_at: unix_millis_now(),
                },
            )
            .await
            .unwrap();
        assert_eq!(f.store.queue_size().unwrap(), 0);
    }

    #[tokio::test]
    async fn deleted_never_synced_path_produces_nothing() {
        let f = fixture(ConflictPolicy::KeepLocal).await;
        let path = f.folder.local_root.join("ephemeral.txt");
        // File already gone, no baseline: create+delete collapsed in the
        // debounce window.
        f.engine
            .process_event(
                &f.folder,
                &FsEvent {
                    path,
                    kind: EventKind::Delete,
                    observed_at: unix_millis_now(),
                },
            )
            .await
            .unwrap();
        assert_eq!(f.store.queue_size().unwrap(), 0);
    }
}
