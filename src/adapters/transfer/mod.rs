//! Bulk transfer service abstraction
//!
//! Transfer jobs copy a submission's data files from the upload area into
//! the destination bucket. Job names are deterministic, so creating the same
//! job twice reports [`TransferCreation::AlreadyExists`] instead of failing.

pub mod memory;

use crate::config::SecretString;
use crate::domain::{Result, TransferJobName};
use async_trait::async_trait;

pub use memory::MemoryTransferService;

/// Source of a transfer: an S3 bucket and path, with credentials
#[derive(Debug, Clone)]
pub struct TransferSource {
    pub bucket: String,
    pub path: String,
    pub access_key_id: String,
    pub access_key_secret: SecretString,
}

/// Destination of a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSink {
    pub bucket: String,
    pub path: String,
}

/// Everything needed to create one transfer job
#[derive(Debug, Clone)]
pub struct TransferJobSpec {
    pub name: TransferJobName,
    pub description: String,
    pub project_id: String,
    pub source: TransferSource,
    pub sink: TransferSink,
    /// Topic that receives completion events, if any
    pub notification_topic: Option<String>,
    /// Whether objects already present at the sink are replaced
    pub overwrite_existing: bool,
}

/// Result of a create call
///
/// A name conflict is a normal result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferCreation {
    Created,
    AlreadyExists,
}

/// Operations of a transfer job are filtered by project and job name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFilter {
    pub project_id: String,
    pub job_name: TransferJobName,
}

/// One run of a transfer job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOperation {
    pub name: String,
    pub done: bool,
}

#[async_trait]
pub trait TransferService: Send + Sync {
    /// Creates the job
    ///
    /// # Errors
    ///
    /// Any failure other than a name conflict is `ExporterError::TransferCouldNotStart`
    async fn create_job(&self, spec: &TransferJobSpec) -> Result<TransferCreation>;

    /// Operations of the job, most recent first
    async fn list_operations(&self, filter: &OperationFilter) -> Result<Vec<TransferOperation>>;
}
