//! Metadata store abstraction
//!
//! The metadata store owns the metadata documents, submissions, export jobs
//! and the schema registry. The exporter reads documents and advances export
//! job state through this trait.

pub mod http;
pub mod memory;

use crate::domain::{
    ExportJob, ExportJobId, ExportJobPatch, MetadataNode, Relation, Result, Submission,
};
use crate::domain::metadata::EntityKind;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

pub use http::IngestApiClient;
pub use memory::MemoryMetadataStore;

/// Schemas the exporter stamps onto generated documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Links,
    FileDescriptor,
    /// Type schema of generated supplementary files (the project spreadsheet)
    SupplementaryFile,
}

impl SchemaKind {
    /// Concrete entity name in the schema registry
    pub fn concrete_entity(&self) -> &'static str {
        match self {
            SchemaKind::Links => "links",
            SchemaKind::FileDescriptor => "file_descriptor",
            SchemaKind::SupplementaryFile => "supplementary_file",
        }
    }

    /// High-level entity the schema is registered under
    pub fn high_level_entity(&self) -> &'static str {
        match self {
            SchemaKind::Links | SchemaKind::FileDescriptor => "system",
            SchemaKind::SupplementaryFile => "type",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.concrete_entity())
    }
}

/// Location and version of a published schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaRef {
    pub url: String,
    pub version: String,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn get_entity(&self, kind: EntityKind, uuid: &str) -> Result<MetadataNode>;

    /// Documents reachable from `of` through `relation`
    ///
    /// The target kind is implied by the relation (see [`Relation::target`]).
    async fn get_related_entities(
        &self,
        relation: Relation,
        of: &MetadataNode,
    ) -> Result<Vec<MetadataNode>>;

    /// The submission envelope, `None` if it has been deleted
    async fn get_submission(&self, uuid: &str) -> Result<Option<Submission>>;

    /// The export job, `None` if it does not exist in this environment
    async fn get_export_job(&self, id: &ExportJobId) -> Result<Option<ExportJob>>;

    async fn patch_export_job(&self, id: &ExportJobId, patch: ExportJobPatch) -> Result<()>;

    async fn get_latest_schema(&self, kind: SchemaKind) -> Result<SchemaRef>;

    /// Records one completed entity (assay) of an export job
    async fn create_export_entity(&self, id: &ExportJobId, entity_id: &str) -> Result<()>;

    /// Number of entities recorded as completed, read fresh on every call
    async fn count_completed_entities(&self, id: &ExportJobId) -> Result<u64>;

    async fn export_entity_exists(&self, id: &ExportJobId, entity_id: &str) -> Result<bool>;

    /// Stores a generated assay manifest
    async fn create_bundle_manifest(&self, manifest: &Value) -> Result<()>;
}
