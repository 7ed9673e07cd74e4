//! `run`: consume export messages until interrupted
//!
//! Metadata is read from and written to the configured Ingest API. The
//! broker, staging store and transfer service are in-process, so a run is
//! local: messages come from `--messages`, staged documents stay in memory
//! and are summarised when the run ends.

use crate::adapters::broker::{MemoryBroker, MessageBroker};
use crate::adapters::metadata::IngestApiClient;
use crate::adapters::notification::MemoryNotificationChannel;
use crate::adapters::storage::MemoryObjectStore;
use crate::adapters::transfer::MemoryTransferService;
use crate::cli::{EXIT_CONNECTION, EXIT_FATAL};
use crate::config::ExporterConfig;
use crate::core::staging::RequiredFieldsValidator;
use crate::domain::{ExporterError, Result};
use crate::service::{Collaborators, ExporterService};
use clap::Args;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON lines file of `{"routingKey": ..., "message": {...}}` to publish
    /// before consuming
    #[arg(long, value_name = "FILE")]
    pub messages: Option<PathBuf>,
}

/// One line of the `--messages` file
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueuedMessage {
    routing_key: String,
    message: serde_json::Value,
}

fn read_messages(path: &Path) -> Result<Vec<QueuedMessage>> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ExporterError::Io(format!("Failed to read {}: {e}", path.display())))?;
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line).map_err(|e| {
                ExporterError::Parse(format!("{}:{}: {e}", path.display(), number + 1))
            })
        })
        .collect()
}

impl RunArgs {
    pub async fn execute(
        &self,
        config: ExporterConfig,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        let messages = match &self.messages {
            Some(path) => match read_messages(path) {
                Ok(messages) => messages,
                Err(e) => {
                    eprintln!("Cannot read messages: {e}");
                    return Ok(EXIT_FATAL);
                }
            },
            None => Vec::new(),
        };

        let metadata = match IngestApiClient::new(&config.ingest) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                eprintln!("Failed to create Ingest API client: {e}");
                return Ok(EXIT_CONNECTION);
            }
        };
        let broker = Arc::new(MemoryBroker::new());
        let objects = Arc::new(MemoryObjectStore::new());
        tracing::warn!("Broker, staging store and transfer service are in-process for this run");

        let service = ExporterService::build(
            &config,
            Collaborators {
                metadata,
                objects: objects.clone(),
                transfer: Arc::new(MemoryTransferService::new()),
                notifications: Arc::new(MemoryNotificationChannel::new()),
                broker: broker.clone(),
                validator: Arc::new(RequiredFieldsValidator),
                spreadsheets: None,
            },
        );

        for route in service.gateway().routes() {
            broker.declare(&route.binding).await?;
        }
        for queued in &messages {
            broker.send(
                &config.broker.exchange,
                &queued.routing_key,
                serde_json::to_vec(&queued.message)?,
            );
        }
        tracing::info!(messages = messages.len(), "Messages queued");

        let result = service.run(shutdown_signal).await;

        println!();
        println!("Acked: {}", broker.acked().len());
        println!("Rejected: {}", broker.rejected().len());
        println!("Staged objects: {}", objects.keys().len());

        match result {
            Ok(()) => Ok(0),
            Err(e) => {
                tracing::error!(error = %e, "Exporter stopped with an error");
                eprintln!("Exporter failed: {e}");
                Ok(EXIT_FATAL)
            }
        }
    }
}
