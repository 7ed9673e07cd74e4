//! Service assembly
//!
//! Wires the collaborators and configuration into the message gateway and
//! the transfer notification listener.

use crate::adapters::broker::MessageBroker;
use crate::adapters::metadata::MetadataStore;
use crate::adapters::notification::NotificationChannel;
use crate::adapters::storage::ObjectStore;
use crate::adapters::transfer::TransferService;
use crate::config::ExporterConfig;
use crate::core::export::{
    ExperimentExporter, ExperimentHandler, ManifestExporter, ManifestHandler, SpreadsheetExporter,
    SpreadsheetGenerator, SpreadsheetHandler, SubmissionExporter, SubmissionHandler,
};
use crate::core::staging::{DocumentValidator, SchemaService, StagingArea, StagingWriter};
use crate::core::state::ExportJobTracker;
use crate::core::transfer::{TransferCoordinator, TransferResponder};
use crate::domain::Result;
use crate::gateway::{MessageGateway, QueueRoute};
use std::sync::Arc;
use tokio::sync::watch;

/// External systems the exporter talks to
#[derive(Clone)]
pub struct Collaborators {
    pub metadata: Arc<dyn MetadataStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub transfer: Arc<dyn TransferService>,
    pub notifications: Arc<dyn NotificationChannel>,
    pub broker: Arc<dyn MessageBroker>,
    pub validator: Arc<dyn DocumentValidator>,
    /// Without a generator the spreadsheet queue is not consumed
    pub spreadsheets: Option<Arc<dyn SpreadsheetGenerator>>,
}

pub struct ExporterService {
    gateway: Arc<MessageGateway>,
    responder: TransferResponder,
}

impl ExporterService {
    pub fn build(config: &ExporterConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            metadata,
            objects,
            transfer,
            notifications,
            broker,
            validator,
            spreadsheets,
        } = collaborators;

        let tracker = Arc::new(ExportJobTracker::new(metadata.clone()));
        let schemas = Arc::new(SchemaService::new(
            metadata.clone(),
            validator,
            config.ingest.schema_cache_ttl(),
        ));
        let staging = Arc::new(StagingArea::new(
            StagingWriter::new(objects, &config.staging),
            schemas,
            &config.staging.key_prefix,
        ));
        let coordinator = Arc::new(TransferCoordinator::new(
            transfer,
            config.transfer.project_id.clone(),
            config.transfer.poll_backoff(),
        ));

        let broker_config = &config.broker;
        let experiment = ExperimentHandler::new(
            ExperimentExporter::new(metadata.clone(), staging.clone()),
            tracker.clone(),
        );
        let submission = SubmissionHandler::new(
            SubmissionExporter::new(
                metadata.clone(),
                coordinator,
                tracker.clone(),
                config.transfer.clone(),
            ),
            tracker.clone(),
        );
        let manifest = ManifestHandler::new(ManifestExporter::new(metadata.clone()));

        let mut gateway = MessageGateway::new(broker, broker_config)
            .route(QueueRoute::from_config(
                broker_config,
                &broker_config.experiment,
                Arc::new(experiment),
            ))
            .route(QueueRoute::from_config(
                broker_config,
                &broker_config.submission,
                Arc::new(submission),
            ))
            .route(QueueRoute::from_config(
                broker_config,
                &broker_config.manifest,
                Arc::new(manifest),
            ));

        match spreadsheets {
            Some(generator) => {
                let spreadsheet = SpreadsheetHandler::new(
                    SpreadsheetExporter::new(metadata, generator, staging),
                    tracker.clone(),
                );
                gateway = gateway.route(QueueRoute::from_config(
                    broker_config,
                    &broker_config.spreadsheet,
                    Arc::new(spreadsheet),
                ));
            }
            None => tracing::warn!(
                queue = %broker_config.spreadsheet.queue,
                "No spreadsheet generator configured, spreadsheet export disabled"
            ),
        }

        let responder = TransferResponder::new(
            notifications,
            tracker,
            &config.transfer.project_id,
            &config.transfer.notification_topic,
        );

        Self {
            gateway: Arc::new(gateway),
            responder,
        }
    }

    pub fn gateway(&self) -> &Arc<MessageGateway> {
        &self.gateway
    }

    pub fn responder(&self) -> &TransferResponder {
        &self.responder
    }

    /// Consumes every queue and listens for transfer notifications until
    /// shutdown is signalled
    ///
    /// # Errors
    ///
    /// Returns the first failure of either side; the other keeps running
    /// until shutdown.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<()> {
        tracing::info!(
            queues = self.gateway.routes().len(),
            subscription = %self.responder.subscription(),
            "Exporter running"
        );
        let (gateway, responder) = tokio::join!(
            Arc::clone(&self.gateway).run(shutdown.clone()),
            self.responder.listen(shutdown),
        );
        gateway.and(responder)
    }
}
