//! Domain models and types for the exporter.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Identifiers** ([`ExportJobId`], [`TransferJobName`])
//! - **Metadata documents** ([`MetadataNode`], [`Submission`])
//! - **Export job model** ([`ExportJob`], [`ExportJobState`], [`TaskState`])
//! - **Broker message schemas** ([`ExperimentMessage`], [`SubmissionExportMessage`], ...)
//! - **Error types** ([`ExporterError`], [`MetadataError`], [`StorageError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, ExporterError>`]:
//!
//! ```rust
//! use ingest_exporter::domain::{ExperimentMessage, Result};
//! use ingest_exporter::domain::messages::decode;
//!
//! fn read(body: &[u8]) -> Result<ExperimentMessage> {
//!     decode(body)
//! }
//! ```

pub mod context;
pub mod errors;
pub mod export_job;
pub mod ids;
pub mod messages;
pub mod metadata;
pub mod result;

pub use errors::{ExporterError, MetadataError, StorageError};
pub use export_job::{ExportJob, ExportJobPatch, ExportJobState, SubStateDimension, TaskState};
pub use ids::{ExportJobId, TransferJobName};
pub use messages::{ExperimentMessage, ManifestMessage, SpreadsheetMessage, SubmissionExportMessage};
pub use metadata::{EntityKind, MetadataNode, Relation, Submission};
pub use result::Result;
