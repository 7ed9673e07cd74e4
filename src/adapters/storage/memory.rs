//! In-memory object store
//!
//! Used by tests and local dry runs. Supports injecting transient failures
//! and slowing down metadata patches to widen race windows.

use super::{CreateOutcome, ObjectMetadata, ObjectStore};
use crate::domain::{Result, StorageError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: ObjectMetadata,
}

/// Thread-safe in-memory [`ObjectStore`]
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
    uploads: AtomicUsize,
    failing_patches: AtomicUsize,
    patch_delay: Mutex<Option<Duration>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` metadata patches fail as unavailable
    pub fn fail_next_patches(&self, count: usize) {
        self.failing_patches.store(count, Ordering::SeqCst);
    }

    /// Delays every metadata patch by `delay`
    pub fn set_patch_delay(&self, delay: Duration) {
        if let Ok(mut guard) = self.patch_delay.lock() {
            *guard = Some(delay);
        }
    }

    /// Number of physical uploads performed (creates and overwrites)
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Keys currently stored, in order
    pub fn keys(&self) -> Vec<String> {
        self.lock()
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Inserts an object directly, bypassing upload accounting
    pub fn insert_raw(&self, key: &str, data: impl Into<Bytes>, metadata: ObjectMetadata) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(
                key.to_string(),
                StoredObject {
                    data: data.into(),
                    metadata,
                },
            );
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, StoredObject>>> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Backend("object map lock poisoned".to_string()).into())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn create_if_absent(&self, key: &str, data: Bytes) -> Result<CreateOutcome> {
        let mut objects = self.lock()?;
        if objects.contains_key(key) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                metadata: ObjectMetadata::new(),
            },
        );
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(CreateOutcome::Created)
    }

    async fn overwrite(&self, key: &str, data: Bytes) -> Result<()> {
        let mut objects = self.lock()?;
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                metadata: ObjectMetadata::new(),
            },
        );
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn patch_metadata(&self, key: &str, flags: ObjectMetadata) -> Result<()> {
        let delay = self.patch_delay.lock().ok().and_then(|guard| *guard);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failing = self
            .failing_patches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(StorageError::Unavailable(format!("patch of {key} rejected")).into());
        }

        let mut objects = self.lock()?;
        let object = objects
            .get_mut(key)
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;
        object.metadata.extend(flags);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.lock()?.contains_key(key))
    }

    async fn get_metadata(&self, key: &str) -> Result<Option<ObjectMetadata>> {
        Ok(self.lock()?.get(key).map(|object| object.metadata.clone()))
    }

    async fn get(&self, key: &str) -> Result<Bytes> {
        self.lock()?
            .get(key)
            .map(|object| object.data.clone())
            .ok_or_else(|| StorageError::NotFound(key.to_string()).into())
    }

    async fn delete_all(&self, prefix: &str) -> Result<usize> {
        let mut objects = self.lock()?;
        let before = objects.len();
        objects.retain(|key, _| !key.starts_with(prefix));
        Ok(before - objects.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_if_absent_conflicts() {
        let store = MemoryObjectStore::new();
        let first = store
            .create_if_absent("a/b.json", Bytes::from_static(b"1"))
            .await
            .unwrap();
        let second = store
            .create_if_absent("a/b.json", Bytes::from_static(b"2"))
            .await
            .unwrap();

        assert_eq!(first, CreateOutcome::Created);
        assert_eq!(second, CreateOutcome::AlreadyExists);
        assert_eq!(store.get("a/b.json").await.unwrap(), Bytes::from_static(b"1"));
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_patch_metadata_merges_and_fails_on_demand() {
        let store = MemoryObjectStore::new();
        store.overwrite("k", Bytes::from_static(b"x")).await.unwrap();
        store.fail_next_patches(1);

        let flags: ObjectMetadata = [("exportCompleted".to_string(), "true".to_string())].into();
        let err = store.patch_metadata("k", flags.clone()).await.unwrap_err();
        assert!(err.is_retryable());

        store.patch_metadata("k", flags).await.unwrap();
        let metadata = store.get_metadata("k").await.unwrap().unwrap();
        assert_eq!(metadata.get("exportCompleted").map(String::as_str), Some("true"));
    }

    #[tokio::test]
    async fn test_patch_missing_object_is_not_found() {
        let store = MemoryObjectStore::new();
        let err = store
            .patch_metadata("missing", ObjectMetadata::new())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_delete_all_by_prefix() {
        let store = MemoryObjectStore::new();
        store.overwrite("p/1", Bytes::new()).await.unwrap();
        store.overwrite("p/2", Bytes::new()).await.unwrap();
        store.overwrite("q/1", Bytes::new()).await.unwrap();

        assert_eq!(store.delete_all("p/").await.unwrap(), 2);
        assert_eq!(store.keys(), vec!["q/1".to_string()]);
    }
}
