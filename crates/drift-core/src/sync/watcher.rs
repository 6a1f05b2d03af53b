//! Filesystem watcher tasks
//!
//! One task per enabled sync folder subscribes to native change
//! notifications and forwards debounced, exclusion-filtered events to the
//! engine. Editors that write through temp-file renames or many small
//! writes collapse into a single forwarded event per path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind as NotifyKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::models::SyncFolder;
use crate::sync::engine::SyncEngine;
use crate::sync::excludes::ExcludeRules;
use crate::sync::{EventKind, FsEvent};
use crate::util::{relative_key, unix_millis_now};

/// Running watcher task for one folder.
pub struct WatcherHandle {
    pub folder_id: i64,
    stop: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl WatcherHandle {
    /// Signal the task to stop and wait for it to wind down.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

struct PendingEvent {
    kind: EventKind,
    deadline: Instant,
}

/// Spawn the watcher task for a folder.
///
/// `exit_tx` receives the folder id if the notification channel dies; the
/// supervisor owns the restart policy.
pub fn spawn_watcher(
    folder: SyncFolder,
    engine: Arc<SyncEngine>,
    debounce: Duration,
    exit_tx: mpsc::Sender<i64>,
) -> Result<WatcherHandle> {
    let excludes = ExcludeRules::new(&folder.exclude_patterns)?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let folder_id = folder.id;

    let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<notify::Event>>(256);
    let mut watcher = RecommendedWatcher::new(
        move |res| {
            let _ = notify_tx.blocking_send(res);
        },
        notify::Config::default(),
    )?;
    watcher.watch(&folder.local_root, RecursiveMode::Recursive)?;
    info!(folder = folder.id, root = %folder.local_root.display(), "watching folder");

    let task = tokio::spawn(watch_loop(
        folder, engine, excludes, debounce, watcher, notify_rx, stop_rx, exit_tx,
    ));

    Ok(WatcherHandle {
        folder_id,
        stop: stop_tx,
        task,
    })
}

#[allow(clippy::too_many_arguments)]
async fn watch_loop(
    folder: SyncFolder,
    engine: Arc<SyncEngine>,
    excludes: ExcludeRules,
    debounce: Duration,
    // Held so the notification subscription stays alive with the task.
    _watcher: RecommendedWatcher,
    mut notify_rx: mpsc::Receiver<notify::Result<notify::Event>>,
    mut stop_rx: watch::Receiver<bool>,
    exit_tx: mpsc::Sender<i64>,
) {
    let mut pending: HashMap<PathBuf, PendingEvent> = HashMap::new();

    loop {
        let next_deadline = pending.values().map(|p| p.deadline).min();

        tokio::select! {
            _ = stop_rx.changed() => {
                debug!(folder = folder.id, "watcher stopping");
                break;
            }

            received = notify_rx.recv() => {
                match received {
                    Some(Ok(event)) => {
                        for (path, kind) in normalize(&event) {
                            buffer_event(
                                &folder, &excludes, &mut pending, path, kind, debounce,
                            );
                        }
                    }
                    Some(Err(e)) => {
                        // Backend hiccup: log and keep watching.
                        warn!(folder = folder.id, error = %e, "watcher backend error");
                    }
                    None => {
                        error!(folder = folder.id, "watcher channel closed unexpectedly");
                        let _ = exit_tx.send(folder.id).await;
                        break;
                    }
                }
            }

            _ = sleep_until_or_forever(next_deadline) => {
                let now = Instant::now();
                let due: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, p)| p.deadline <= now)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in due {
                    if let Some(event) = pending.remove(&path) {
                        let fs_event = FsEvent {
                            path,
                            kind: event.kind,
                            observed_at: unix_millis_now(),
                        };
                        if let Err(e) = engine.process_event(&folder, &fs_event).await {
                            warn!(
                                folder = folder.id,
                                path = %fs_event.path.display(),
                                error = %e,
                                "event reconcile failed"
                            );
                        }
                    }
                }
            }
        }
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Map a raw notify event onto normalized per-path event kinds.
///
/// Renames forward both sides: the old path as a delete, the new as a
/// create.
fn normalize(event: &notify::Event) -> Vec<(PathBuf, EventKind)> {
    match &event.kind {
        NotifyKind::Create(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), EventKind::Create))
            .collect(),
        NotifyKind::Remove(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), EventKind::Delete))
            .collect(),
        NotifyKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => event
                .paths
                .iter()
                .map(|p| (p.clone(), EventKind::Delete))
                .collect(),
            RenameMode::To => event
                .paths
                .iter()
                .map(|p| (p.clone(), EventKind::Create))
                .collect(),
            RenameMode::Both if event.paths.len() == 2 => vec![
                (event.paths[0].clone(), EventKind::Delete),
                (event.paths[1].clone(), EventKind::Create),
            ],
            // Direction unknown: let existence decide.
            _ => event
                .paths
                .iter()
                .map(|p| {
                    if p.exists() {
                        (p.clone(), EventKind::Create)
                    } else {
                        (p.clone(), EventKind::Delete)
                    }
                })
                .collect(),
        },
        NotifyKind::Modify(_) => event
            .paths
            .iter()
            .map(|p| (p.clone(), EventKind::Modify))
            .collect(),
        _ => Vec::new(),
    }
}

fn buffer_event(
    folder: &SyncFolder,
    excludes: &ExcludeRules,
    pending: &mut HashMap<PathBuf, PendingEvent>,
    path: PathBuf,
    kind: EventKind,
    debounce: Duration,
) {
    let Ok(rel) = relative_key(&folder.local_root, &path) else {
        return;
    };
    if rel.is_empty() || excludes.is_excluded(&rel) {
        return;
    }

    let deadline = Instant::now() + debounce;
    let merged = match pending.get(&path).map(|p| p.kind) {
        // A create followed by writes is still a create.
        Some(EventKind::Create) if kind == EventKind::Modify => EventKind::Create,
        // Delete then create within the window is a replacement.
        Some(EventKind::Delete) if kind == EventKind::Create => EventKind::Modify,
        _ => kind,
    };
    pending.insert(
        path,
        PendingEvent {
            kind: merged,
            deadline,
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewFolder, StateStore};
    use crate::models::{ConflictPolicy, FileState, QueueOp, SyncDirection, SyncStatus};
    use crate::remote::MemoryRemoteStore;

    const TEST_DEBOUNCE: Duration = Duration::from_millis(250);

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<StateStore>,
        remote: Arc<MemoryRemoteStore>,
        engine: Arc<SyncEngine>,
        folder: SyncFolder,
    }

    fn fixture(excludes: Vec<String>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let remote = Arc::new(MemoryRemoteStore::new());
        let folder = store
            .create_folder(&NewFolder {
                local_root: dir.path().canonicalize().unwrap(),
                remote_prefix: "b".to_string(),
                direction: SyncDirection::Bidirectional,
                conflict_policy: ConflictPolicy::KeepLocal,
                exclude_patterns: excludes,
                bandwidth_cap: None,
                poll_interval: None,
            })
            .unwrap();
        let engine = Arc::new(SyncEngine::new(store.clone(), remote.clone(), 3));
        Fixture {
            _dir: dir,
            store,
            remote,
            engine,
            folder,
        }
    }

    #[tokio::test]
    async fn burst_of_writes_produces_one_queue_entry() {
        let f = fixture(vec![]);
        let (exit_tx, _exit_rx) = mpsc::channel(1);
        let handle = spawn_watcher(
            f.folder.clone(),
            f.engine.clone(),
            TEST_DEBOUNCE,
            exit_tx,
        )
        .unwrap();

        // Let the subscription settle.
        tokio::time::sleep(Duration::from_millis(200)).await;

        let path = f.folder.local_root.join("x.txt");
        for i in 0..5 {
            std::fs::write(&path, format!("revision {i}")).unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Wait out the debounce window plus slack.
        tokio::time::sleep(TEST_DEBOUNCE + Duration::from_millis(700)).await;
        handle.shutdown().await;

        assert_eq!(f.store.queue_size().unwrap(), 1);
        let entry = f.store.dequeue().unwrap().unwrap();
        assert_eq!(entry.op, QueueOp::Upload);
        assert_eq!(entry.relative_path, "x.txt");
    }

    #[tokio::test]
    async fn excluded_paths_never_reach_the_queue() {
        let f = fixture(vec!["*.tmp".to_string()]);
        let (exit_tx, _exit_rx) = mpsc::channel(1);
        let handle = spawn_watcher(
            f.folder.clone(),
            f.engine.clone(),
            TEST_DEBOUNCE,
            exit_tx,
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::write(f.folder.local_root.join("scratch.tmp"), b"junk").unwrap();

        tokio::time::sleep(TEST_DEBOUNCE + Duration::from_millis(700)).await;
        handle.shutdown().await;

        assert_eq!(f.store.queue_size().unwrap(), 0);
    }

    #[tokio::test]
    async fn deletion_of_synced_file_enqueues_remote_delete() {
        let f = fixture(vec![]);
        let path = f.folder.local_root.join("tracked.txt");
        std::fs::write(&path, b"v1").unwrap();

        // Seed a synced baseline with the remote side matching.
        let seeded = f.remote.seed("b/tracked.txt", b"v1").await;
        f.store
            .upsert_file_state(&FileState {
                sync_status: SyncStatus::Synced,
                local_hash: Some(seeded.etag.clone()),
                remote_hash: Some(seeded.etag.clone()),
                ..FileState::pending(f.folder.id, "tracked.txt")
            })
            .unwrap();

        let (exit_tx, _exit_rx) = mpsc::channel(1);
        let handle = spawn_watcher(
            f.folder.clone(),
            f.engine.clone(),
            TEST_DEBOUNCE,
            exit_tx,
        )
        .unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        std::fs::remove_file(&path).unwrap();

        tokio::time::sleep(TEST_DEBOUNCE + Duration::from_millis(700)).await;
        handle.shutdown().await;

        let entry = f.store.dequeue().unwrap().unwrap();
        assert_eq!(entry.op, QueueOp::DeleteRemote);
        assert_eq!(entry.relative_path, "tracked.txt");
    }
}
