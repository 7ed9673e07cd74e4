//! Shared setup for the integration tests: a metadata store holding project
//! PR1 and assay process P1 (specimen B1 in, sequence file F1 out), export
//! job E1 of submission S1, and an exporter service wired to in-memory
//! collaborators.

#![allow(dead_code)]

use ingest_exporter::adapters::broker::MemoryBroker;
use ingest_exporter::adapters::metadata::{MemoryMetadataStore, SchemaKind, SchemaRef};
use ingest_exporter::adapters::notification::MemoryNotificationChannel;
use ingest_exporter::adapters::storage::MemoryObjectStore;
use ingest_exporter::adapters::transfer::MemoryTransferService;
use ingest_exporter::config::ExporterConfig;
use ingest_exporter::core::staging::RequiredFieldsValidator;
use ingest_exporter::domain::{
    ExportJob, ExportJobId, ExportJobState, MetadataNode, Relation, Submission, TaskState,
};
use ingest_exporter::service::{Collaborators, ExporterService};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub fn document(kind: &str, uuid: &str, concrete: &str, version: &str) -> Value {
    json!({
        "uuid": {"uuid": uuid},
        "type": kind,
        "dcpVersion": "2021-03-01T10:00:00.000Z",
        "submissionDate": "2021-02-01T10:00:00.000Z",
        "updateDate": "2021-02-02T10:00:00.000Z",
        "content": {
            "describedBy": format!("https://schema.example.org/type/{kind}/{version}/{concrete}"),
            "schema_type": kind.to_lowercase()
        }
    })
}

pub fn file_document(uuid: &str) -> Value {
    let mut doc = document("File", uuid, "sequence_file", "9.2.0");
    doc["dataFileUuid"] = json!(format!("data-{uuid}"));
    doc["fileName"] = json!(format!("{uuid}.fastq.gz"));
    doc["cloudUrl"] = json!(format!("s3://upload-bucket/area-1/{uuid}.fastq.gz"));
    doc["fileContentType"] = json!("application/gzip");
    doc["size"] = json!(1024);
    doc["checksums"] = json!({
        "sha256": "ABCDEF",
        "crc32c": "0A1B2C3D",
        "sha1": "FEDCBA",
        "s3_etag": "etag-1"
    });
    doc
}

pub fn node(doc: Value) -> MetadataNode {
    MetadataNode::from_ingest_json(&doc).unwrap()
}

pub fn job_id(id: &str) -> ExportJobId {
    ExportJobId::new(id).unwrap()
}

pub fn export_job(id: &str, submission: &str, expected: u64) -> ExportJob {
    ExportJob {
        job_id: job_id(id),
        submission_id: submission.to_string(),
        created_date: None,
        updated_date: None,
        state: ExportJobState::Exporting,
        expected_entity_count: expected,
        data_file_transfer: TaskState::NotStarted,
        spreadsheet_generation: TaskState::NotStarted,
    }
}

pub fn metadata() -> Arc<MemoryMetadataStore> {
    let store = Arc::new(MemoryMetadataStore::new());
    for (kind, name) in [
        (SchemaKind::Links, "links"),
        (SchemaKind::FileDescriptor, "file_descriptor"),
    ] {
        store.insert_schema(
            kind,
            SchemaRef {
                url: format!("https://schema.example.org/system/2.0.0/{name}"),
                version: "2.0.0".to_string(),
            },
        );
    }

    let project = node(document("Project", "PR1", "project", "14.2.0"));
    let process = node(document("Process", "P1", "process", "9.2.0"));
    let specimen = node(document("Biomaterial", "B1", "specimen_from_organism", "10.3.0"));
    let file = node(file_document("F1"));
    for n in [&project, &process, &specimen, &file] {
        store.insert_entity(n.clone());
    }
    store.relate(&process, Relation::Projects, &project);
    store.relate(&process, Relation::InputBiomaterials, &specimen);
    store.relate(&process, Relation::DerivedFiles, &file);

    store.insert_submission(Submission {
        uuid: "S1".to_string(),
        submit_actions: vec!["Export".to_string()],
        staging_area_location: Some("s3://upload-bucket/area-1/".to_string()),
    });
    store.insert_export_job(export_job("E1", "S1", 5));
    store
}

pub fn config() -> ExporterConfig {
    toml::from_str(
        r#"
[ingest]
base_url = "https://api.ingest.example.org"

[staging]
bucket = "staging-bucket"

[transfer]
project_id = "gcp-project"
dest_bucket = "staging-bucket"
aws_access_key_id = "AKIA123"
aws_access_key_secret = "secret"
"#,
    )
    .unwrap()
}

pub struct Harness {
    pub metadata: Arc<MemoryMetadataStore>,
    pub objects: Arc<MemoryObjectStore>,
    pub transfers: Arc<MemoryTransferService>,
    pub notifications: Arc<MemoryNotificationChannel>,
    pub broker: Arc<MemoryBroker>,
    pub config: ExporterConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            metadata: metadata(),
            objects: Arc::new(MemoryObjectStore::new()),
            transfers: Arc::new(MemoryTransferService::new()),
            notifications: Arc::new(MemoryNotificationChannel::new()),
            broker: Arc::new(MemoryBroker::new()),
            config: config(),
        }
    }

    pub fn service(&self) -> ExporterService {
        ExporterService::build(
            &self.config,
            Collaborators {
                metadata: self.metadata.clone(),
                objects: self.objects.clone(),
                transfer: self.transfers.clone(),
                notifications: self.notifications.clone(),
                broker: self.broker.clone(),
                validator: Arc::new(RequiredFieldsValidator),
                spreadsheets: None,
            },
        )
    }

    /// Declares the service's queues so messages sent before it runs are kept
    pub async fn declare(&self, service: &ExporterService) {
        use ingest_exporter::adapters::broker::MessageBroker;
        for route in service.gateway().routes() {
            self.broker.declare(&route.binding).await.unwrap();
        }
    }

    pub fn send(&self, routing_key: &str, body: Value) {
        self.broker
            .send(&self.config.broker.exchange, routing_key, body.to_string().into_bytes());
    }
}

/// Runs the service in the background until the returned sender fires
pub fn start(service: ExporterService) -> (watch::Sender<bool>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        service.run(rx).await.unwrap();
    });
    (tx, handle)
}

pub async fn stop(tx: watch::Sender<bool>, handle: JoinHandle<()>) {
    tx.send(true).unwrap();
    handle.await.unwrap();
}

/// Polls `condition` every 100ms of (possibly paused) time until it holds
pub async fn eventually<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(24 * 3600);
    while !condition().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}
