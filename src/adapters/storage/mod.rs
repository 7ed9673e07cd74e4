//! Object store abstraction
//!
//! The staging bucket is the only resource shared between workers. Its
//! atomic create-if-absent is the sole arbitration point between concurrent
//! writers of the same key.

pub mod memory;

use crate::domain::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;

pub use memory::MemoryObjectStore;

/// Side-channel metadata attached to an object
pub type ObjectMetadata = HashMap<String, String>;

/// Result of a conditional create
///
/// A conflict is a normal result, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Writes `data` only if nothing exists at `key`
    async fn create_if_absent(&self, key: &str, data: Bytes) -> Result<CreateOutcome>;

    /// Writes `data` unconditionally, replacing any metadata
    async fn overwrite(&self, key: &str, data: Bytes) -> Result<()>;

    /// Merges `flags` into the object's metadata
    ///
    /// Returns `StorageError::NotFound` if the object does not exist.
    async fn patch_metadata(&self, key: &str, flags: ObjectMetadata) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Metadata of the object, `None` if it does not exist
    async fn get_metadata(&self, key: &str) -> Result<Option<ObjectMetadata>>;

    /// Reads the object's bytes
    async fn get(&self, key: &str) -> Result<Bytes>;

    /// Deletes every object under `prefix`, returning how many were removed
    async fn delete_all(&self, prefix: &str) -> Result<usize>;
}
