// Ingest Exporter - submission export to the data repository staging area
// Copyright (c) 2025 Ingest Exporter Contributors
// Licensed under the MIT License

//! # Ingest Exporter
//!
//! Consumes export messages from the ingest broker and stages each
//! submitted experiment (its metadata graph, file descriptors, links and
//! data files) into a shared staging bucket for the data repository.
//!
//! Messages are delivered at least once and handled concurrently by several
//! workers. The exporter converges anyway: every staged object is written
//! once with a completion flag, a transfer job that already exists is
//! followed instead of re-created, and progress is recorded against the
//! export job so replays are skipped.
//!
//! ## Architecture
//!
//! - [`gateway`] - queue consumers, correlation context, ack/reject and
//!   continuation publishing
//! - [`core`] - graph crawl, staging writes, data-file transfer, export job
//!   tracking and the per-message units of work
//! - [`adapters`] - collaborator traits (metadata store, object store,
//!   transfer service, notifications, broker) and their implementations
//! - [`domain`] - ids, metadata and export job models, message schemas,
//!   errors
//! - [`service`] - assembles the above from configuration
//! - [`config`], [`logging`], [`cli`] - ambient stack
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ingest_exporter::adapters::broker::MemoryBroker;
//! use ingest_exporter::adapters::metadata::IngestApiClient;
//! use ingest_exporter::adapters::notification::MemoryNotificationChannel;
//! use ingest_exporter::adapters::storage::MemoryObjectStore;
//! use ingest_exporter::adapters::transfer::MemoryTransferService;
//! use ingest_exporter::config::load_config;
//! use ingest_exporter::core::staging::RequiredFieldsValidator;
//! use ingest_exporter::service::{Collaborators, ExporterService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("ingest-exporter.toml")?;
//!     let service = ExporterService::build(
//!         &config,
//!         Collaborators {
//!             metadata: Arc::new(IngestApiClient::new(&config.ingest)?),
//!             objects: Arc::new(MemoryObjectStore::new()),
//!             transfer: Arc::new(MemoryTransferService::new()),
//!             notifications: Arc::new(MemoryNotificationChannel::new()),
//!             broker: Arc::new(MemoryBroker::new()),
//!             validator: Arc::new(RequiredFieldsValidator),
//!             spreadsheets: None,
//!         },
//!     );
//!
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     service.run(shutdown_rx).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Library code returns [`domain::ExporterError`]. A handler error rejects
//! its message without requeue so it is dead-lettered; skips (stale job,
//! deleted submission, replay) are outcomes, not errors.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod gateway;
pub mod logging;
pub mod service;
