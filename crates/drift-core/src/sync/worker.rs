//! Worker pool
//!
//! Stateless workers drain the queue: dequeue, execute the transfer,
//! record the outcome in both the queue entry and the activity log.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::db::{NewActivity, StateStore};
use crate::error::Result;
use crate::models::{ActivityStatus, FileState, QueueEntry, QueueOp, SyncFolder, SyncStatus};
use crate::remote::{RemoteError, RemoteStore};
use crate::sync::hasher::hash_bytes;
use crate::sync::limiter::RateLimiter;
use crate::util::{local_path, remote_key, unix_millis_now};

const CHUNK_SIZE: usize = 64 * 1024;
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// Worker pool tuning.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub count: usize,
    pub op_timeout: Duration,
    /// Pool-wide transfer cap in bytes per second
    pub bandwidth_cap: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: crate::sync::DEFAULT_WORKER_COUNT,
            op_timeout: Duration::from_secs(30),
            bandwidth_cap: None,
        }
    }
}

/// Registry of in-flight operations, used to cancel work for a folder (or
/// everything at shutdown) promptly.
#[derive(Clone, Default)]
pub struct ActiveOps {
    inner: Arc<Mutex<HashMap<i64, ActiveOp>>>,
}

struct ActiveOp {
    folder_id: i64,
    cancel: Arc<AtomicBool>,
}

impl ActiveOps {
    fn register(&self, entry_id: i64, folder_id: i64) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(false));
        self.inner
            .lock()
            .expect("active ops mutex poisoned")
            .insert(
                entry_id,
                ActiveOp {
                    folder_id,
                    cancel: cancel.clone(),
                },
            );
        cancel
    }

    fn unregister(&self, entry_id: i64) {
        self.inner
            .lock()
            .expect("active ops mutex poisoned")
            .remove(&entry_id);
    }

    /// Trip the cancel flag for every in-flight op of one folder.
    pub fn cancel_folder(&self, folder_id: i64) -> usize {
        let ops = self.inner.lock().expect("active ops mutex poisoned");
        let mut cancelled = 0;
        for op in ops.values() {
            if op.folder_id == folder_id {
                op.cancel.store(true, Ordering::SeqCst);
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Trip every cancel flag (daemon shutdown).
    pub fn cancel_all(&self) {
        let ops = self.inner.lock().expect("active ops mutex poisoned");
        for op in ops.values() {
            op.cancel.store(true, Ordering::SeqCst);
        }
    }
}

/// Outcome of a successfully executed operation.
struct OpOutcome {
    bytes: u64,
}

/// Internal failure classification for one execution attempt.
enum OpError {
    Remote(RemoteError),
    Io(std::io::Error),
    Integrity(String),
    Timeout,
    Cancelled,
    Store(crate::error::Error),
}

impl OpError {
    fn message(&self) -> String {
        match self {
            Self::Remote(e) => e.to_string(),
            Self::Io(e) => format!("I/O error: {e}"),
            Self::Integrity(msg) => format!("integrity mismatch: {msg}"),
            Self::Timeout => "operation deadline exceeded".to_string(),
            Self::Cancelled => "cancelled".to_string(),
            Self::Store(e) => format!("state store error: {e}"),
        }
    }
}

/// Fixed-size pool of queue-draining workers.
pub struct WorkerPool {
    store: Arc<StateStore>,
    remote: Arc<dyn RemoteStore>,
    config: WorkerConfig,
    pool_limiter: Arc<RateLimiter>,
    folder_limiters: Mutex<HashMap<i64, Arc<RateLimiter>>>,
    active: ActiveOps,
}

impl WorkerPool {
    pub fn new(store: Arc<StateStore>, remote: Arc<dyn RemoteStore>, config: WorkerConfig) -> Self {
        let pool_limiter = Arc::new(RateLimiter::new(config.bandwidth_cap));
        Self {
            store,
            remote,
            config,
            pool_limiter,
            folder_limiters: Mutex::new(HashMap::new()),
            active: ActiveOps::default(),
        }
    }

    /// Handle to the in-flight registry, shared with the control plane.
    pub fn active_ops(&self) -> ActiveOps {
        self.active.clone()
    }

    /// Spawn the worker tasks. Each loops until the shutdown channel trips.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.count.max(1))
            .map(|worker| {
                let pool = self.clone();
                let mut shutdown = shutdown.clone();
                tokio::spawn(async move {
                    debug!(worker, "worker started");
                    loop {
                        if *shutdown.borrow() {
                            break;
                        }
                        match pool.run_one().await {
                            Ok(true) => continue,
                            Ok(false) => {
                                // Idle: wait for more work or shutdown.
                                tokio::select! {
                                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                                    _ = shutdown.changed() => {}
                                }
                            }
                            // Corrupt rows (unknown op or status strings) are
                            // not retryable; stop rather than spin on them.
                            Err(e @ crate::error::Error::Invariant(_)) => {
                                error!(worker, error = %e, "state store is corrupt, stopping worker");
                                break;
                            }
                            Err(e) => {
                                error!(worker, error = %e, "worker pass failed");
                                tokio::time::sleep(Duration::from_secs(1)).await;
                            }
                        }
                    }
                    debug!(worker, "worker stopped");
                })
            })
            .collect()
    }

    /// Dequeue and execute at most one entry. Returns whether one was run.
    pub async fn run_one(&self) -> Result<bool> {
        let Some(entry) = self.store.dequeue()? else {
            return Ok(false);
        };
        self.execute_entry(entry).await;
        Ok(true)
    }

    async fn execute_entry(&self, entry: QueueEntry) {
        let started = Instant::now();

        let folder = match self.store.get_folder(entry.folder_id) {
            Ok(Some(folder)) => folder,
            Ok(None) => {
                // Folder removed between enqueue and dequeue; the row is
                // already gone or about to cascade.
                self.store
                    .complete_permanent(entry.id, "sync folder removed")
                    .ok();
                return;
            }
            Err(e) => {
                error!(entry = entry.id, error = %e, "cannot load folder for entry");
                self.store.complete(entry.id, false, Some(&e.to_string())).ok();
                return;
            }
        };

        let cancel = self.active.register(entry.id, folder.id);
        let result = tokio::select! {
            r = tokio::time::timeout(
                self.config.op_timeout,
                self.execute_op(&folder, &entry, &cancel),
            ) => match r {
                Ok(inner) => inner,
                Err(_) => Err(OpError::Timeout),
            },
            _ = watch_cancel(cancel.clone()) => Err(OpError::Cancelled),
        };
        self.active.unregister(entry.id);

        let duration_ms = started.elapsed().as_millis() as i64;
        self.record_outcome(&entry, result, duration_ms);
    }

    fn record_outcome(
        &self,
        entry: &QueueEntry,
        result: std::result::Result<OpOutcome, OpError>,
        duration_ms: i64,
    ) {
        let (status, bytes, message) = match result {
            Ok(outcome) => {
                if let Err(e) = self.store.complete(entry.id, true, None) {
                    error!(entry = entry.id, error = %e, "cannot mark entry completed");
                }
                info!(
                    op = entry.op.as_str(),
                    path = %entry.relative_path,
                    bytes = outcome.bytes,
                    "transfer complete"
                );
                (ActivityStatus::Success, Some(outcome.bytes as i64), None)
            }
            Err(OpError::Cancelled) => {
                self.store.complete_cancelled(entry.id).ok();
                info!(op = entry.op.as_str(), path = %entry.relative_path, "transfer cancelled");
                (ActivityStatus::Cancelled, None, Some("cancelled".to_string()))
            }
            Err(error) => {
                let message = error.message();
                let permanent = match &error {
                    OpError::Remote(e) => !e.is_transient(),
                    // Integrity gets one retry, then counts as permanent.
                    OpError::Integrity(_) => entry.attempts >= 2,
                    OpError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
                    OpError::Timeout | OpError::Store(_) => false,
                    OpError::Cancelled => unreachable!(),
                };

                if permanent {
                    self.store.complete_permanent(entry.id, &message).ok();
                    warn!(
                        op = entry.op.as_str(),
                        path = %entry.relative_path,
                        error = %message,
                        "transfer failed permanently"
                    );
                    (ActivityStatus::Failed, None, Some(message))
                } else {
                    self.store.complete(entry.id, false, Some(&message)).ok();
                    let retrying = entry.attempts < entry.max_attempts;
                    warn!(
                        op = entry.op.as_str(),
                        path = %entry.relative_path,
                        attempt = entry.attempts,
                        error = %message,
                        "transfer attempt failed"
                    );
                    (
                        if retrying {
                            ActivityStatus::Retrying
                        } else {
                            ActivityStatus::Failed
                        },
                        None,
                        Some(message),
                    )
                }
            }
        };

        // The folder may have been removed while we ran; activity keeps the
        // text either way.
        let folder_id = match self.store.get_folder(entry.folder_id) {
            Ok(Some(_)) => Some(entry.folder_id),
            _ => None,
        };
        let logged = self.store.log_activity(&NewActivity {
            folder_id,
            operation: entry.op.as_str().to_string(),
            path: entry.relative_path.clone(),
            status,
            details: None,
            error_message: message,
            bytes_transferred: bytes,
            duration_ms: Some(duration_ms),
        });
        if let Err(e) = logged {
            error!(entry = entry.id, error = %e, "cannot log activity");
        }
    }

    async fn execute_op(
        &self,
        folder: &SyncFolder,
        entry: &QueueEntry,
        cancel: &AtomicBool,
    ) -> std::result::Result<OpOutcome, OpError> {
        let key = remote_key(&folder.remote_prefix, &entry.relative_path);
        let path = local_path(&folder.local_root, &entry.relative_path);
        let limiter = self.limiter_for(folder);

        match entry.op {
            QueueOp::Upload => self.upload(folder, entry, &key, &path, &limiter, cancel).await,
            QueueOp::Download => {
                self.download(folder, entry, &key, &path, &limiter, cancel)
                    .await
            }
            QueueOp::DeleteRemote => {
                self.remote.delete(&key).await.map_err(OpError::Remote)?;
                self.store
                    .delete_file_state(folder.id, &entry.relative_path)
                    .map_err(OpError::Store)?;
                Ok(OpOutcome { bytes: 0 })
            }
            QueueOp::DeleteLocal => {
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(OpError::Io(e)),
                }
                self.store
                    .delete_file_state(folder.id, &entry.relative_path)
                    .map_err(OpError::Store)?;
                Ok(OpOutcome { bytes: 0 })
            }
        }
    }

    async fn upload(
        &self,
        folder: &SyncFolder,
        entry: &QueueEntry,
        key: &str,
        path: &Path,
        limiter: &RateLimiter,
        cancel: &AtomicBool,
    ) -> std::result::Result<OpOutcome, OpError> {
        // Stream the file through the shaper, hashing as we go.
        let mut file = std::fs::File::open(path).map_err(OpError::Io)?;
        let metadata = file.metadata().map_err(OpError::Io)?;
        let mut body = Vec::with_capacity(metadata.len() as usize);
        let mut buffer = vec![0u8; CHUNK_SIZE];
        loop {
            if cancel.load(Ordering::SeqCst) {
                return Err(OpError::Cancelled);
            }
            let read = file.read(&mut buffer).map_err(OpError::Io)?;
            if read == 0 {
                break;
            }
            body.extend_from_slice(&buffer[..read]);
            self.pool_limiter.throttle(read).await;
            limiter.throttle(read).await;
        }

        let local_hash = hash_bytes(&body);
        let size = body.len() as u64;
        let outcome = self.remote.put(key, body).await.map_err(OpError::Remote)?;
        if cancel.load(Ordering::SeqCst) {
            return Err(OpError::Cancelled);
        }
        if outcome.etag != local_hash {
            return Err(OpError::Integrity(format!(
                "{key}: local {local_hash}, remote {}",
                outcome.etag
            )));
        }

        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);
        self.store
            .upsert_file_state(&FileState {
                sync_status: SyncStatus::Synced,
                local_hash: Some(local_hash.clone()),
                remote_hash: Some(local_hash),
                local_mtime: mtime,
                remote_mtime: Some(unix_millis_now()),
                local_size: Some(size as i64),
                remote_size: Some(size as i64),
                last_synced_at: Some(unix_millis_now()),
                ..FileState::pending(folder.id, &entry.relative_path)
            })
            .map_err(OpError::Store)?;

        Ok(OpOutcome { bytes: size })
    }

    async fn download(
        &self,
        folder: &SyncFolder,
        entry: &QueueEntry,
        key: &str,
        path: &Path,
        limiter: &RateLimiter,
        cancel: &AtomicBool,
    ) -> std::result::Result<OpOutcome, OpError> {
        let blob = self.remote.get(key).await.map_err(OpError::Remote)?;
        if cancel.load(Ordering::SeqCst) {
            return Err(OpError::Cancelled);
        }

        let content_hash = hash_bytes(&blob.bytes);
        if !blob.etag.is_empty() && blob.etag != content_hash {
            return Err(OpError::Integrity(format!(
                "{key}: body {content_hash}, etag {}",
                blob.etag
            )));
        }

        // Write to a temp file next to the target, fsync, atomic rename.
        let parent = path.parent().ok_or_else(|| {
            OpError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "download target has no parent directory",
            ))
        })?;
        std::fs::create_dir_all(parent).map_err(OpError::Io)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "download".to_string());
        let tmp_path = parent.join(format!(".{file_name}.drift-tmp"));

        {
            use std::io::Write;
            let mut tmp = std::fs::File::create(&tmp_path).map_err(OpError::Io)?;
            for chunk in blob.bytes.chunks(CHUNK_SIZE) {
                if cancel.load(Ordering::SeqCst) {
                    drop(tmp);
                    std::fs::remove_file(&tmp_path).ok();
                    return Err(OpError::Cancelled);
                }
                tmp.write_all(chunk).map_err(OpError::Io)?;
                self.pool_limiter.throttle(chunk.len()).await;
                limiter.throttle(chunk.len()).await;
            }
            tmp.sync_all().map_err(OpError::Io)?;
        }
        std::fs::rename(&tmp_path, path).map_err(OpError::Io)?;

        let size = blob.bytes.len() as u64;
        self.store
            .upsert_file_state(&FileState {
                sync_status: SyncStatus::Synced,
                local_hash: Some(content_hash.clone()),
                remote_hash: Some(content_hash),
                local_mtime: Some(unix_millis_now()),
                remote_mtime: blob.mtime,
                local_size: Some(size as i64),
                remote_size: Some(size as i64),
                last_synced_at: Some(unix_millis_now()),
                ..FileState::pending(folder.id, &entry.relative_path)
            })
            .map_err(OpError::Store)?;

        Ok(OpOutcome { bytes: size })
    }

    fn limiter_for(&self, folder: &SyncFolder) -> Arc<RateLimiter> {
        let mut limiters = self
            .folder_limiters
            .lock()
            .expect("limiter map mutex poisoned");
        limiters
            .entry(folder.id)
            .or_insert_with(|| Arc::new(RateLimiter::new(folder.bandwidth_cap)))
            .clone()
    }
}

async fn watch_cancel(flag: Arc<AtomicBool>) {
    while !flag.load(Ordering::SeqCst) {
        tokio::time::sleep(CANCEL_POLL).await;
    }
}
