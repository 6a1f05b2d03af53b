//! In-memory remote store used by the test suite and local dry runs.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::util::unix_millis_now;

use super::{
    PutOutcome, RemoteBlob, RemoteError, RemoteObject, RemoteResult, RemoteStore,
};

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    etag: String,
    mtime: i64,
}

/// Deterministic [`RemoteStore`] holding objects in a map.
///
/// Failures can be scripted with [`MemoryRemoteStore::fail_next`]: each queued
/// error is returned by exactly one subsequent operation, in order. An
/// optional latency makes cancellation windows observable in tests.
#[derive(Default)]
pub struct MemoryRemoteStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    scripted_failures: Mutex<VecDeque<RemoteError>>,
    latency: Mutex<Option<Duration>>,
    tamper_puts: std::sync::atomic::AtomicBool,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error to be returned by the next operation.
    pub async fn fail_next(&self, error: RemoteError) {
        self.scripted_failures.lock().await.push_back(error);
    }

    /// Delay every operation by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.lock().await = Some(latency);
    }

    /// Make `put` return a bogus etag while still storing the bytes,
    /// simulating a corrupted transfer.
    pub async fn set_tamper_puts(&self, tamper: bool) {
        self.tamper_puts
            .store(tamper, std::sync::atomic::Ordering::SeqCst);
    }

    /// Directly seed an object, bypassing failure scripting.
    pub async fn seed(&self, key: &str, bytes: &[u8]) -> RemoteObject {
        let stored = StoredObject {
            bytes: bytes.to_vec(),
            etag: content_etag(bytes),
            mtime: unix_millis_now(),
        };
        let object = RemoteObject {
            key: key.to_string(),
            size: stored.bytes.len() as u64,
            etag: stored.etag.clone(),
            mtime: Some(stored.mtime),
        };
        self.objects.lock().await.insert(key.to_string(), stored);
        object
    }

    /// Overwrite an object's etag to simulate an out-of-band remote edit.
    pub async fn corrupt_etag(&self, key: &str, etag: &str) {
        if let Some(stored) = self.objects.lock().await.get_mut(key) {
            stored.etag = etag.to_string();
            stored.mtime = unix_millis_now();
        }
    }

    /// Raw object bytes, for assertions.
    pub async fn bytes_of(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().await.get(key).map(|o| o.bytes.clone())
    }

    pub async fn object_count(&self) -> usize {
        self.objects.lock().await.len()
    }

    async fn intercept(&self) -> RemoteResult<()> {
        let latency = *self.latency.lock().await;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(error) = self.scripted_failures.lock().await.pop_front() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> RemoteResult<PutOutcome> {
        self.intercept().await?;
        let etag = if self.tamper_puts.load(std::sync::atomic::Ordering::SeqCst) {
            "0000000000000000000000000000000000000000000000000000000000000000".to_string()
        } else {
            content_etag(&bytes)
        };
        let size = bytes.len() as u64;
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                bytes,
                etag: etag.clone(),
                mtime: unix_millis_now(),
            },
        );
        Ok(PutOutcome { etag, size })
    }

    async fn get(&self, key: &str) -> RemoteResult<RemoteBlob> {
        self.intercept().await?;
        let objects = self.objects.lock().await;
        let stored = objects
            .get(key)
            .ok_or_else(|| RemoteError::NotFound(key.to_string()))?;
        Ok(RemoteBlob {
            bytes: stored.bytes.clone(),
            etag: stored.etag.clone(),
            mtime: Some(stored.mtime),
        })
    }

    async fn delete(&self, key: &str) -> RemoteResult<()> {
        self.intercept().await?;
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> RemoteResult<Vec<RemoteObject>> {
        self.intercept().await?;
        let objects = self.objects.lock().await;
        let mut listed: Vec<RemoteObject> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, stored)| RemoteObject {
                key: key.clone(),
                size: stored.bytes.len() as u64,
                etag: stored.etag.clone(),
                mtime: Some(stored.mtime),
            })
            .collect();
        listed.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(listed)
    }

    async fn stat(&self, key: &str) -> RemoteResult<Option<RemoteObject>> {
        self.intercept().await?;
        let objects = self.objects.lock().await;
        Ok(objects.get(key).map(|stored| RemoteObject {
            key: key.to_string(),
            size: stored.bytes.len() as u64,
            etag: stored.etag.clone(),
            mtime: Some(stored.mtime),
        }))
    }

    async fn ping(&self) -> RemoteResult<()> {
        self.intercept().await
    }
}

fn content_etag(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_round_trip() {
        let store = MemoryRemoteStore::new();
        let outcome = store.put("a/x.txt", b"hello".to_vec()).await.unwrap();
        assert_eq!(outcome.size, 5);

        let blob = store.get("a/x.txt").await.unwrap();
        assert_eq!(blob.bytes, b"hello");
        assert_eq!(blob.etag, outcome.etag);
    }

    #[tokio::test]
    async fn etag_is_content_sha256() {
        let store = MemoryRemoteStore::new();
        let outcome = store.put("k", b"hello".to_vec()).await.unwrap();
        assert_eq!(
            outcome.etag,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn scripted_failures_fire_in_order() {
        let store = MemoryRemoteStore::new();
        store.fail_next(RemoteError::Timeout("one".into())).await;
        store.fail_next(RemoteError::Denied("two".into())).await;

        assert!(matches!(
            store.ping().await,
            Err(RemoteError::Timeout(_))
        ));
        assert!(matches!(
            store.put("k", vec![]).await,
            Err(RemoteError::Denied(_))
        ));
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryRemoteStore::new();
        store.seed("a/one.txt", b"1").await;
        store.seed("a/two.txt", b"2").await;
        store.seed("b/three.txt", b"3").await;

        let listed = store.list("a/").await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].key, "a/one.txt");
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let store = MemoryRemoteStore::new();
        assert!(store.delete("nope").await.is_ok());
    }
}
