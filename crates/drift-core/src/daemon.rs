//! Daemon supervisor
//!
//! Owns the runtime wiring: state store, engine, worker pool, per-folder
//! watcher tasks, periodic maintenance tickers, and the control server.
//! Components only share the store handle and channels; none reaches into
//! another's internals.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{error, info, warn};

use crate::config::{db_path, socket_path, DaemonConfig};
use crate::db::{NewFolder, StateStore};
use crate::error::{Error, Result};
use crate::ipc::{
    commands, AddFolderRequest, AddFolderResponse, CommandHandler, FolderStatus, ForceSyncRequest,
    GetActivityRequest, GetActivityResponse, GetConfigResponse, RemoveFolderRequest,
    ResolveConflictRequest, Response, SetConfigRequest, StatusResponse,
};
use crate::models::{SyncFolder, SyncStatus};
use crate::remote::{HttpRemoteStore, RemoteStore, StaticCredentials};
use crate::sync::watcher::{spawn_watcher, WatcherHandle};
use crate::sync::worker::{WorkerConfig, WorkerPool};
use crate::sync::engine::SyncEngine;

/// The running daemon.
#[derive(Clone)]
pub struct Daemon {
    inner: Arc<DaemonInner>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
}

struct DaemonInner {
    data_dir: PathBuf,
    config: RwLock<Arc<DaemonConfig>>,
    store: Arc<StateStore>,
    engine: Arc<SyncEngine>,
    pool: Arc<WorkerPool>,
    watchers: Mutex<HashMap<i64, WatcherHandle>>,
    watcher_exit_tx: mpsc::Sender<i64>,
    watcher_exit_rx: Mutex<Option<mpsc::Receiver<i64>>>,
    started_at: Instant,
}

impl Daemon {
    /// Build a daemon against an explicit remote store (tests, dry runs).
    pub fn with_remote(
        data_dir: PathBuf,
        config: DaemonConfig,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&data_dir)?;
        let store = Arc::new(StateStore::open(db_path(&data_dir))?);

        // Crash recovery: anything stranded in `processing` past the grace
        // period goes back to `pending` without burning an attempt.
        let recovered = store.recover_stale(config.stale_grace())?;
        if recovered > 0 {
            info!(recovered, "recovered stranded queue entries from previous run");
        }

        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            remote.clone(),
            config.max_attempts,
        ));
        let pool = Arc::new(WorkerPool::new(
            store.clone(),
            remote,
            WorkerConfig {
                count: config.worker_threads,
                op_timeout: config.op_timeout(),
                bandwidth_cap: config.bandwidth_cap,
            },
        ));

        let (watcher_exit_tx, watcher_exit_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(DaemonInner {
                data_dir,
                config: RwLock::new(Arc::new(config)),
                store,
                engine,
                pool,
                watchers: Mutex::new(HashMap::new()),
                watcher_exit_tx,
                watcher_exit_rx: Mutex::new(Some(watcher_exit_rx)),
                started_at: Instant::now(),
            }),
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
        })
    }

    /// Build a daemon from its config, connecting to the configured remote.
    pub fn open(data_dir: PathBuf, config: DaemonConfig) -> Result<Self> {
        if config.remote.endpoint.trim().is_empty() {
            return Err(Error::Config(
                "remote.endpoint is not configured; edit daemon.json or run `drift config set`"
                    .into(),
            ));
        }
        let credentials = Arc::new(StaticCredentials::new(config.remote.api_key.clone()));
        let remote = Arc::new(
            HttpRemoteStore::with_timeout(
                config.remote.endpoint.clone(),
                credentials,
                config.op_timeout(),
            )
            .map_err(Error::Remote)?,
        );
        Self::with_remote(data_dir, config, remote)
    }

    /// Trip the shutdown flag; every loop and in-flight transfer observes it.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        self.inner.pool.active_ops().cancel_all();
    }

    /// Shared state store handle (primarily for tests and the status path).
    pub fn store(&self) -> Arc<StateStore> {
        self.inner.store.clone()
    }

    /// Run the daemon until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<()> {
        let inner = &self.inner;
        info!(data_dir = %inner.data_dir.display(), "daemon starting");

        // Watchers for every enabled folder.
        let folders = inner.store.list_folders()?;
        for folder in &folders {
            if folder.enabled {
                if let Err(e) = inner.start_watcher(folder.clone()).await {
                    warn!(folder = folder.id, error = %e, "cannot start watcher");
                }
            }
        }

        // Worker pool.
        let worker_handles = inner.pool.spawn(self.shutdown_rx.clone());

        // Control server.
        let handler: Arc<dyn CommandHandler> = inner.clone();
        let control = tokio::spawn(crate::ipc::serve(
            socket_path(&inner.data_dir),
            handler,
            self.shutdown_rx.clone(),
        ));

        // Queue drain ticker: move failed-but-retryable entries back to
        // pending once their backoff elapses.
        let drain = {
            let inner = inner.clone();
            let mut shutdown = self.shutdown_rx.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(inner.snapshot().drain_interval());
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => {
                            let config = inner.snapshot();
                            match inner.store.requeue_failed(
                                config.retry_base_delay(),
                                config.retry_max_delay(),
                            ) {
                                Ok(0) => {}
                                Ok(n) => info!(requeued = n, "requeued failed entries"),
                                Err(e) => error!(error = %e, "requeue pass failed"),
                            }
                        }
                    }
                }
            })
        };

        // Retention ticker: GC terminal queue entries and aged activity.
        let gc = {
            let inner = inner.clone();
            let mut shutdown = self.shutdown_rx.clone();
            tokio::spawn(async move {
                let mut ticker =
                    tokio::time::interval(std::time::Duration::from_secs(3600));
                ticker.tick().await; // skip the immediate first tick
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = ticker.tick() => {
                            let config = inner.snapshot();
                            if let Err(e) = inner.store.gc_queue(config.queue_retention()) {
                                error!(error = %e, "queue gc failed");
                            }
                            match inner.store.gc_activity(config.activity_retention()) {
                                Ok(0) => {}
                                Ok(n) => info!(removed = n, "activity log trimmed"),
                                Err(e) => error!(error = %e, "activity gc failed"),
                            }
                        }
                    }
                }
            })
        };

        // Watcher supervisor: restart any watcher whose event channel died.
        let supervisor = {
            let inner = inner.clone();
            let mut shutdown = self.shutdown_rx.clone();
            let mut exit_rx = inner
                .watcher_exit_rx
                .lock()
                .await
                .take()
                .ok_or_else(|| Error::Invariant("daemon run() called twice".into()))?;
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        exited = exit_rx.recv() => {
                            let Some(folder_id) = exited else { break };
                            warn!(folder = folder_id, "watcher exited, restarting");
                            inner.watchers.lock().await.remove(&folder_id);
                            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                            match inner.store.get_folder(folder_id) {
                                Ok(Some(folder)) if folder.enabled => {
                                    if let Err(e) = inner.start_watcher(folder).await {
                                        error!(folder = folder_id, error = %e, "watcher restart failed");
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
            })
        };

        // Startup scan of every enabled folder.
        for folder in folders.into_iter().filter(|f| f.enabled) {
            let engine = inner.engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.scan_folder(&folder).await {
                    error!(folder = folder.id, error = %e, "startup scan failed");
                }
            });
        }

        // Park until shutdown.
        let mut shutdown = self.shutdown_rx.clone();
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("daemon shutting down");

        // Stop watchers, then wait for the service tasks.
        let handles: Vec<WatcherHandle> = {
            let mut watchers = inner.watchers.lock().await;
            watchers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in handles {
            handle.shutdown().await;
        }
        for handle in worker_handles {
            let _ = handle.await;
        }
        let _ = drain.await;
        let _ = gc.await;
        let _ = supervisor.await;
        match control.await {
            Ok(result) => result?,
            Err(e) => error!(error = %e, "control server task panicked"),
        }

        info!("daemon stopped");
        Ok(())
    }

    /// Run until SIGINT/SIGTERM.
    pub async fn run_until_signal(&self) -> Result<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut sigterm = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(signal) => signal,
                Err(e) => {
                    error!(error = %e, "cannot install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            info!("signal received");
            this.shutdown();
        });
        self.run().await
    }
}

impl DaemonInner {
    fn snapshot(&self) -> Arc<DaemonConfig> {
        self.config.read().expect("config lock poisoned").clone()
    }

    async fn start_watcher(&self, folder: SyncFolder) -> Result<()> {
        let debounce = self.snapshot().debounce();
        let handle = spawn_watcher(
            folder,
            self.engine.clone(),
            debounce,
            self.watcher_exit_tx.clone(),
        )?;
        self.watchers.lock().await.insert(handle.folder_id, handle);
        Ok(())
    }

    async fn stop_watcher(&self, folder_id: i64) {
        if let Some(handle) = self.watchers.lock().await.remove(&folder_id) {
            handle.shutdown().await;
        }
    }

    async fn handle_status(&self) -> Result<Response> {
        let folders = self.store.list_folders()?;
        let mut statuses = Vec::with_capacity(folders.len());
        for folder in &folders {
            statuses.push(FolderStatus {
                id: folder.id,
                local_root: folder.local_root.clone(),
                remote_prefix: folder.remote_prefix.clone(),
                direction: folder.direction,
                enabled: folder.enabled,
                pending_files: self.store.count_file_states(folder.id, SyncStatus::Pending)?,
                pending_queue: self.store.queue_size_for_folder(folder.id)?,
                conflicts: self.store.count_file_states(folder.id, SyncStatus::Conflict)?,
            });
        }

        Ok(Response::ok(StatusResponse {
            daemon_running: true,
            uptime_secs: self.started_at.elapsed().as_secs(),
            queue_size: self.store.queue_size()?,
            terminal_failed: self.store.terminal_failed_count(None)?,
            unresolved_conflicts: self.store.unresolved_conflict_count()?,
            folders: statuses,
            pending_conflicts: self.store.unresolved_conflicts(None)?,
        }))
    }

    async fn handle_add_folder(&self, request: AddFolderRequest) -> Result<Response> {
        if !request.local_root.is_dir() {
            return Err(Error::InvalidInput(format!(
                "local root is not a directory: {}",
                request.local_root.display()
            )));
        }

        let folder = self.store.create_folder(&NewFolder {
            local_root: request.local_root,
            remote_prefix: request.remote_prefix,
            direction: request.direction,
            conflict_policy: request.conflict_policy,
            exclude_patterns: request.exclude_patterns,
            bandwidth_cap: request.bandwidth_cap,
            poll_interval: request.poll_interval,
        })?;

        self.start_watcher(folder.clone()).await?;

        // Initial scan runs in the background; the command returns at once.
        let engine = self.engine.clone();
        let scan_folder = folder.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.scan_folder(&scan_folder).await {
                error!(folder = scan_folder.id, error = %e, "initial scan failed");
            }
        });

        info!(folder = folder.id, root = %folder.local_root.display(), "sync folder added");
        Ok(Response::ok(AddFolderResponse { id: folder.id }))
    }

    async fn handle_remove_folder(&self, request: RemoveFolderRequest) -> Result<Response> {
        // Abort in-flight transfers first so nothing writes rows back while
        // the cascade delete runs.
        let cancelled = self.pool.active_ops().cancel_folder(request.id);
        if cancelled > 0 {
            info!(folder = request.id, cancelled, "cancelled in-flight transfers");
        }
        self.stop_watcher(request.id).await;
        self.store.delete_folder(request.id)?;
        info!(folder = request.id, "sync folder removed");
        Ok(Response::ok_empty())
    }

    async fn handle_get_activity(&self, request: GetActivityRequest) -> Result<Response> {
        let activities = self
            .store
            .recent_activity(request.limit, request.folder_id)?;
        Ok(Response::ok(GetActivityResponse { activities }))
    }

    async fn handle_force_sync(&self, request: ForceSyncRequest) -> Result<Response> {
        let folders = match request.folder_id {
            Some(id) => vec![self
                .store
                .get_folder(id)?
                .ok_or_else(|| Error::NotFound(format!("folder {id}")))?],
            None => self.store.list_folders()?,
        };

        // Scans are scheduled, not awaited: callers poll `status` for
        // completion.
        for folder in folders.into_iter().filter(|f| f.enabled) {
            let engine = self.engine.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.scan_folder(&folder).await {
                    error!(folder = folder.id, error = %e, "forced scan failed");
                }
            });
        }
        Ok(Response::ok_empty())
    }

    async fn handle_get_config(&self) -> Result<Response> {
        Ok(Response::ok(GetConfigResponse {
            config: (*self.snapshot()).clone(),
        }))
    }

    async fn handle_set_config(&self, request: SetConfigRequest) -> Result<Response> {
        request.config.validate()?;
        request.config.save(&self.data_dir)?;
        *self.config.write().expect("config lock poisoned") = Arc::new(request.config);
        info!("configuration updated");
        // Worker count and bandwidth caps apply on the next daemon start;
        // timers pick the new values up on their next tick.
        Ok(Response::ok_empty())
    }

    async fn handle_resolve_conflict(&self, request: ResolveConflictRequest) -> Result<Response> {
        let resolved = self
            .engine
            .resolve_conflict(request.conflict_id, request.choice)
            .await?;
        info!(
            conflict = request.conflict_id,
            choice = request.choice.as_str(),
            "conflict resolved"
        );
        Ok(Response::ok(resolved))
    }
}

#[async_trait]
impl CommandHandler for DaemonInner {
    async fn handle(&self, command: &str, data: serde_json::Value) -> Response {
        let result = match command {
            commands::STATUS => self.handle_status().await,
            commands::ADD_SYNC_FOLDER => match serde_json::from_value(data) {
                Ok(request) => self.handle_add_folder(request).await,
                Err(e) => Err(Error::InvalidInput(e.to_string())),
            },
            commands::REMOVE_SYNC_FOLDER => match serde_json::from_value(data) {
                Ok(request) => self.handle_remove_folder(request).await,
                Err(e) => Err(Error::InvalidInput(e.to_string())),
            },
            commands::GET_ACTIVITY => match serde_json::from_value(data) {
                Ok(request) => self.handle_get_activity(request).await,
                Err(e) => Err(Error::InvalidInput(e.to_string())),
            },
            commands::FORCE_SYNC => match serde_json::from_value(data) {
                Ok(request) => self.handle_force_sync(request).await,
                Err(e) => Err(Error::InvalidInput(e.to_string())),
            },
            commands::GET_CONFIG => self.handle_get_config().await,
            commands::SET_CONFIG => match serde_json::from_value(data) {
                Ok(request) => self.handle_set_config(request).await,
                Err(e) => Err(Error::InvalidInput(e.to_string())),
            },
            commands::RESOLVE_CONFLICT => match serde_json::from_value(data) {
                Ok(request) => self.handle_resolve_conflict(request).await,
                Err(e) => Err(Error::InvalidInput(e.to_string())),
            },
            other => Err(Error::Control(format!("unknown command: {other}"))),
        };

        result.unwrap_or_else(|e| Response::error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ControlClient;
    use crate::models::{ConflictPolicy, SyncDirection};
    use crate::remote::MemoryRemoteStore;
    use std::time::Duration;

    struct Fixture {
        _data: tempfile::TempDir,
        tree: tempfile::TempDir,
        daemon: Daemon,
        remote: Arc<MemoryRemoteStore>,
        client: ControlClient,
        task: tokio::task::JoinHandle<Result<()>>,
    }

    async fn start() -> Fixture {
        let data = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();
        let remote = Arc::new(MemoryRemoteStore::new());
        let config = DaemonConfig {
            debounce_secs: 1,
            drain_interval_secs: 1,
            retry_base_delay_secs: 1,
            ..DaemonConfig::default()
        };
        let daemon =
            Daemon::with_remote(data.path().to_path_buf(), config, remote.clone()).unwrap();

        let run_daemon = daemon.clone();
        let task = tokio::spawn(async move { run_daemon.run().await });

        let socket = socket_path(data.path());
        for _ in 0..100 {
            if tokio::net::UnixStream::connect(&socket).await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let client = ControlClient::new(socket);
        Fixture {
            _data: data,
            tree,
            daemon,
            remote,
            client,
            task,
        }
    }

    fn add_request(f: &Fixture) -> AddFolderRequest {
        AddFolderRequest {
            local_root: f.tree.path().canonicalize().unwrap(),
            remote_prefix: "b".to_string(),
            direction: SyncDirection::Bidirectional,
            conflict_policy: ConflictPolicy::KeepLocal,
            exclude_patterns: vec![],
            bandwidth_cap: None,
            poll_interval: None,
        }
    }

    async fn stop(f: Fixture) {
        f.daemon.shutdown();
        f.task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn fresh_upload_end_to_end() {
        let f = start().await;
        std::fs::write(f.tree.path().join("x.txt"), b"hello").unwrap();

        let added = f.client.add_folder(&add_request(&f)).await.unwrap();

        // The initial scan enqueues the upload and a worker drains it.
        let mut synced = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if f.remote.bytes_of("b/x.txt").await.as_deref() == Some(b"hello".as_slice()) {
                synced = true;
                break;
            }
        }
        assert!(synced, "upload never reached the remote");

        let state = f
            .daemon
            .store()
            .file_state(added.id, "x.txt")
            .unwrap()
            .unwrap();
        assert_eq!(state.sync_status, SyncStatus::Synced);
        assert_eq!(state.local_hash, state.remote_hash);

        let activity = f.client.activity(10, None).await.unwrap();
        assert!(activity
            .iter()
            .any(|a| a.operation == "upload" && a.path == "x.txt"));

        stop(f).await;
    }

    #[tokio::test]
    async fn status_reports_folders_and_queue() {
        let f = start().await;
        f.client.add_folder(&add_request(&f)).await.unwrap();

        let status = f.client.status().await.unwrap();
        assert!(status.daemon_running);
        assert_eq!(status.folders.len(), 1);
        assert_eq!(status.folders[0].remote_prefix, "b");

        stop(f).await;
    }

    #[tokio::test]
    async fn remove_folder_cascades_and_cancels() {
        let f = start().await;
        std::fs::write(f.tree.path().join("big.bin"), vec![1u8; 4096]).unwrap();
        f.remote.set_latency(Duration::from_millis(300)).await;

        let added = f.client.add_folder(&add_request(&f)).await.unwrap();
        // Give the scan a moment to enqueue and a worker to pick it up.
        tokio::time::sleep(Duration::from_millis(200)).await;

        f.client.remove_folder(added.id).await.unwrap();

        let store = f.daemon.store();
        assert!(store.get_folder(added.id).unwrap().is_none());
        let states: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM file_states", [], |r| r.get(0))
            .unwrap();
        let queued: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM sync_queue", [], |r| r.get(0))
            .unwrap();
        assert_eq!((states, queued), (0, 0));

        stop(f).await;
    }

    #[tokio::test]
    async fn force_sync_returns_immediately_and_schedules() {
        let f = start().await;
        let added = f.client.add_folder(&add_request(&f)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::write(f.tree.path().join("later.txt"), b"v2").unwrap();
        f.client.force_sync(Some(added.id)).await.unwrap();

        let mut synced = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if f.remote.bytes_of("b/later.txt").await.is_some() {
                synced = true;
                break;
            }
        }
        assert!(synced, "forced scan never uploaded the file");

        stop(f).await;
    }

    #[tokio::test]
    async fn config_round_trip_over_control_channel() {
        let f = start().await;

        let mut config = f.client.get_config().await.unwrap();
        config.debounce_secs = 7;
        f.client.set_config(&config).await.unwrap();

        let reread = f.client.get_config().await.unwrap();
        assert_eq!(reread.debounce_secs, 7);

        stop(f).await;
    }

    #[tokio::test]
    async fn crash_recovery_retries_stranded_upload() {
        let data = tempfile::tempdir().unwrap();
        let tree = tempfile::tempdir().unwrap();
        std::fs::write(tree.path().join("x.txt"), b"hello").unwrap();

        // Simulate the previous daemon run dying mid-upload: an entry stuck
        // in `processing` with a stale `started_at`.
        let folder_id = {
            let store = StateStore::open(db_path(data.path())).unwrap();
            let folder = store
                .create_folder(&NewFolder {
                    local_root: tree.path().canonicalize().unwrap(),
                    remote_prefix: "b".to_string(),
                    direction: SyncDirection::Bidirectional,
                    conflict_policy: ConflictPolicy::KeepLocal,
                    exclude_patterns: vec![],
                    bandwidth_cap: None,
                    poll_interval: None,
                })
                .unwrap();
            store
                .enqueue(&crate::db::NewQueueEntry {
                    folder_id: folder.id,
                    relative_path: "x.txt".to_string(),
                    op: crate::models::QueueOp::Upload,
                    priority: 0,
                    max_attempts: 3,
                })
                .unwrap();
            store.dequeue().unwrap().unwrap();
            store
                .conn()
                .execute("UPDATE sync_queue SET started_at = started_at - 120000", [])
                .unwrap();
            folder.id
        };

        let remote = Arc::new(MemoryRemoteStore::new());
        let daemon = Daemon::with_remote(
            data.path().to_path_buf(),
            DaemonConfig::default(),
            remote.clone(),
        )
        .unwrap();
        let run_daemon = daemon.clone();
        let task = tokio::spawn(async move { run_daemon.run().await });

        let mut synced = false;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if remote.bytes_of("b/x.txt").await.is_some() {
                synced = true;
                break;
            }
        }
        assert!(synced, "recovered entry was never retried");

        let state = daemon
            .store()
            .file_state(folder_id, "x.txt")
            .unwrap()
            .unwrap();
        assert_eq!(state.sync_status, SyncStatus::Synced);

        daemon.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn overlapping_folder_is_rejected_via_control_channel() {
        let f = start().await;
        f.client.add_folder(&add_request(&f)).await.unwrap();

        let err = f.client.add_folder(&add_request(&f)).await.unwrap_err();
        assert!(err.to_string().contains("overlaps"));

        stop(f).await;
    }
}
