//! Collaborator interfaces and their implementations.
//!
//! The core never talks to an external system directly. Every collaborator
//! is a trait here, injected into the components that need it:
//!
//! - [`metadata`] - metadata documents, submissions, export jobs, schemas
//!   ([`metadata::IngestApiClient`] over the ingest REST API)
//! - [`storage`] - the staging object store
//! - [`transfer`] - the bulk data-file transfer service
//! - [`notification`] - push notifications from the transfer service
//! - [`broker`] - the message broker the gateway consumes from
//!
//! Each module also ships an in-memory implementation used by the tests and
//! by local dry runs.
//!
//! ```rust,no_run
//! use ingest_exporter::adapters::metadata::{IngestApiClient, MetadataStore};
//! use ingest_exporter::config::IngestConfig;
//! use ingest_exporter::domain::ExportJobId;
//!
//! # async fn example() -> ingest_exporter::domain::Result<()> {
//! let client = IngestApiClient::new(&IngestConfig::default())?;
//! let job = client.get_export_job(&ExportJobId::new("E1").map_err(
//!     ingest_exporter::domain::ExporterError::Parse,
//! )?).await?;
//! println!("{:?}", job.map(|j| j.state));
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod metadata;
pub mod notification;
pub mod storage;
pub mod transfer;
