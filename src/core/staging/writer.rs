//! Write-once staging protocol
//!
//! Concurrent writers of the same key are arbitrated by the object store's
//! create-if-absent. The winner uploads and then sets the completion flag;
//! every loser waits for the flag instead of uploading again. Readers treat
//! an object without the flag as not yet written.

use crate::adapters::storage::{CreateOutcome, ObjectMetadata, ObjectStore};
use crate::config::StagingConfig;
use crate::core::backoff::{Attempt, Exhausted, ExponentialBackoff};
use crate::domain::{ExporterError, Result};
use bytes::Bytes;
use std::sync::Arc;

/// Metadata key marking an object as completely written
pub const COMPLETION_FLAG: &str = "exportCompleted";

/// How a successful write was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// This call uploaded the bytes and set the completion flag
    Written,
    /// Another writer uploaded the object; its completion flag was observed
    Verified,
}

pub struct StagingWriter {
    store: Arc<dyn ObjectStore>,
    patch_backoff: ExponentialBackoff,
    verify_backoff: ExponentialBackoff,
}

impl StagingWriter {
    pub fn new(store: Arc<dyn ObjectStore>, config: &StagingConfig) -> Self {
        Self::with_backoff(store, config.patch_backoff(), config.verify_backoff())
    }

    pub fn with_backoff(
        store: Arc<dyn ObjectStore>,
        patch_backoff: ExponentialBackoff,
        verify_backoff: ExponentialBackoff,
    ) -> Self {
        Self {
            store,
            patch_backoff,
            verify_backoff,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Writes `data` at `key`
    ///
    /// With `overwrite` the bytes are put unconditionally. Otherwise the
    /// write only happens if nothing exists at `key`; on conflict the call
    /// waits for the existing object's completion flag.
    ///
    /// # Errors
    ///
    /// Returns `ExporterError::UploadVerificationTimeout` if a conflicting
    /// object never reports completion within the verification deadline.
    pub async fn write(&self, key: &str, data: Bytes, overwrite: bool) -> Result<WriteOutcome> {
        if overwrite {
            self.store.overwrite(key, data).await?;
            self.mark_complete(key).await?;
            tracing::info!(key, overwrite, "Staged object");
            return Ok(WriteOutcome::Written);
        }

        match self.store.create_if_absent(key, data).await? {
            CreateOutcome::Created => {
                self.mark_complete(key).await?;
                tracing::info!(key, "Staged object");
                Ok(WriteOutcome::Written)
            }
            CreateOutcome::AlreadyExists => {
                tracing::debug!(key, "Object already exists, verifying completion");
                self.await_completion(key).await?;
                tracing::info!(key, "Verified object staged by another writer");
                Ok(WriteOutcome::Verified)
            }
        }
    }

    /// Whether the object at `key` exists and carries the completion flag
    pub async fn is_complete(&self, key: &str) -> Result<bool> {
        Ok(self
            .store
            .get_metadata(key)
            .await?
            .is_some_and(|metadata| has_completion_flag(&metadata)))
    }

    async fn mark_complete(&self, key: &str) -> Result<()> {
        let flags: ObjectMetadata = [(COMPLETION_FLAG.to_string(), "true".to_string())].into();

        let outcome = self
            .patch_backoff
            .run(|| {
                let flags = flags.clone();
                async move {
                    match self.store.patch_metadata(key, flags).await {
                        Ok(()) => Attempt::Done(Ok(())),
                        Err(e) if e.is_retryable() => {
                            tracing::warn!(key, error = %e, "Completion flag patch failed, retrying");
                            Attempt::Retry(e)
                        }
                        Err(e) => Attempt::Done(Err(e)),
                    }
                }
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(Exhausted::Deadline { last, waited }) => {
                tracing::error!(key, waited_ms = waited.as_millis() as u64, error = %last, "Gave up patching completion flag");
                Err(last)
            }
        }
    }

    async fn await_completion(&self, key: &str) -> Result<()> {
        let outcome = self
            .verify_backoff
            .run(|| async move {
                match self.store.get_metadata(key).await {
                    Ok(Some(metadata)) if has_completion_flag(&metadata) => Attempt::Done(Ok(())),
                    Ok(_) => Attempt::Retry(()),
                    Err(e) if e.is_retryable() => Attempt::Retry(()),
                    Err(e) => Attempt::Done(Err(e)),
                }
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(Exhausted::Deadline { waited, .. }) => Err(ExporterError::UploadVerificationTimeout {
                key: key.to_string(),
                waited,
            }),
        }
    }
}

fn has_completion_flag(metadata: &ObjectMetadata) -> bool {
    metadata
        .get(COMPLETION_FLAG)
        .is_some_and(|value| value.eq_ignore_ascii_case("true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::MemoryObjectStore;
    use std::time::Duration;

    fn writer(store: Arc<MemoryObjectStore>) -> StagingWriter {
        StagingWriter::with_backoff(
            store,
            ExponentialBackoff::new(Duration::from_secs(1), Some(Duration::from_secs(60)), Duration::from_secs(600)),
            ExponentialBackoff::new(Duration::from_millis(100), None, Duration::from_secs(3600)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_sets_completion_flag() {
        let store = Arc::new(MemoryObjectStore::new());
        let writer = writer(store.clone());

        let outcome = writer
            .write("proj/metadata/x.json", Bytes::from_static(b"{}"), false)
            .await
            .unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert!(writer.is_complete("proj/metadata/x.json").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overwrite_replaces_and_marks_complete() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert_raw("k", Bytes::from_static(b"old"), ObjectMetadata::new());
        let writer = writer(store.clone());

        let outcome = writer.write("k", Bytes::from_static(b"new"), true).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Written);
        assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"new"));
        assert!(writer.is_complete("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_patch_failures_are_retried() {
        let store = Arc::new(MemoryObjectStore::new());
        store.fail_next_patches(3);
        let writer = writer(store.clone());

        writer.write("k", Bytes::from_static(b"x"), false).await.unwrap();

        assert!(writer.is_complete("k").await.unwrap());
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_with_incomplete_object_times_out() {
        let store = Arc::new(MemoryObjectStore::new());
        store.insert_raw("k", Bytes::from_static(b"partial"), ObjectMetadata::new());
        let writer = writer(store.clone());
        let started = tokio::time::Instant::now();

        let err = writer
            .write("k", Bytes::from_static(b"x"), false)
            .await
            .unwrap_err();

        match err {
            ExporterError::UploadVerificationTimeout { key, waited } => {
                assert_eq!(key, "k");
                assert_eq!(waited, Duration::from_secs(3600));
            }
            other => panic!("unexpected error {other}"),
        }
        assert_eq!(started.elapsed(), Duration::from_secs(3600));
        assert_eq!(store.get("k").await.unwrap(), Bytes::from_static(b"partial"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_with_complete_object_is_verified() {
        let store = Arc::new(MemoryObjectStore::new());
        let flags: ObjectMetadata = [(COMPLETION_FLAG.to_string(), "true".to_string())].into();
        store.insert_raw("k", Bytes::from_static(b"done"), flags);
        let writer = writer(store.clone());

        let outcome = writer.write("k", Bytes::from_static(b"x"), false).await.unwrap();

        assert_eq!(outcome, WriteOutcome::Verified);
        assert_eq!(store.upload_count(), 0);
    }
}
