//! Export coordination engine
//!
//! # Modules
//!
//! - [`graph`] - Experiment graph model and the crawler that builds it
//! - [`staging`] - Write-once staging protocol and the staging-area layout
//! - [`transfer`] - Bulk data-file transfer: start, poll and push completion
//! - [`state`] - Export job progress tracking
//! - [`export`] - The unit of work behind each message type
//! - [`backoff`] - Deadline-bounded exponential backoff shared by the polls
//!
//! # Experiment Export Workflow
//!
//! 1. **Guard**: skip if the export job is gone, its submission deleted, or
//!    the assay already recorded
//! 2. **Crawl**: walk the process graph from the assay to build the
//!    experiment graph
//! 3. **Stage**: write every document once, verified by the completion flag
//! 4. **Record**: register the assay; the last one flips the job to EXPORTED
//!
//! # Example
//!
//! ```rust,no_run
//! use ingest_exporter::adapters::metadata::MemoryMetadataStore;
//! use ingest_exporter::adapters::storage::MemoryObjectStore;
//! use ingest_exporter::config::StagingConfig;
//! use ingest_exporter::core::export::ExperimentExporter;
//! use ingest_exporter::core::staging::{RequiredFieldsValidator, SchemaService, StagingArea, StagingWriter};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example() -> ingest_exporter::domain::Result<()> {
//! let metadata = Arc::new(MemoryMetadataStore::new());
//! let config = StagingConfig::default();
//! let writer = StagingWriter::new(Arc::new(MemoryObjectStore::new()), &config);
//! let schemas = Arc::new(SchemaService::new(
//!     metadata.clone(),
//!     Arc::new(RequiredFieldsValidator),
//!     Duration::from_secs(300),
//! ));
//! let staging = Arc::new(StagingArea::new(writer, schemas, &config.key_prefix));
//!
//! let exporter = ExperimentExporter::new(metadata, staging);
//! let graph = exporter.export("process-uuid").await?;
//! println!("Staged {} documents", graph.nodes.len());
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod export;
pub mod graph;
pub mod staging;
pub mod state;
pub mod transfer;
