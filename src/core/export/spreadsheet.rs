//! Spreadsheet export: stage the project's metadata spreadsheet as a
//! supplementary file of the project

use super::active_job;
use crate::adapters::metadata::{MetadataStore, SchemaKind};
use crate::core::graph::ExperimentGraph;
use crate::core::staging::StagingArea;
use crate::core::state::ExportJobTracker;
use crate::domain::{
    EntityKind, ExportJobId, MetadataNode, Result, SpreadsheetMessage, SubStateDimension,
    TaskState,
};
use crate::gateway::{CorrelationContext, Guard, MessageHandler};
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::{json, Value};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// Renders the metadata spreadsheet of a submission
#[async_trait]
pub trait SpreadsheetGenerator: Send + Sync {
    /// Workbook bytes in xlsx format
    async fn generate(&self, submission_uuid: &str) -> Result<Bytes>;
}

pub struct SpreadsheetExporter {
    store: Arc<dyn MetadataStore>,
    generator: Arc<dyn SpreadsheetGenerator>,
    staging: Arc<StagingArea>,
}

impl SpreadsheetExporter {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        generator: Arc<dyn SpreadsheetGenerator>,
        staging: Arc<StagingArea>,
    ) -> Self {
        Self {
            store,
            generator,
            staging,
        }
    }

    /// Generates the spreadsheet and stages its file metadata, descriptor,
    /// project link and bytes; returns the staged file node
    ///
    /// Re-running for the same export job converges on the documents of the
    /// first run.
    pub async fn export(
        &self,
        export_job_id: &ExportJobId,
        submission_uuid: &str,
        project_uuid: &str,
    ) -> Result<MetadataNode> {
        tracing::info!(%export_job_id, submission_uuid, project_uuid, "Generating spreadsheet");
        let workbook = self.generator.generate(submission_uuid).await?;
        let project = self.store.get_entity(EntityKind::Project, project_uuid).await?;
        let file = self.file_metadata(&workbook, &project, export_job_id).await?;

        self.staging.write_metadata(&file, &project.uuid).await?;
        let graph = ExperimentGraph::from_supplementary_files(&project, vec![file.clone()]);
        self.staging
            .write_links(&graph.links, &file.uuid, &file.dcp_version, &project.uuid)
            .await?;
        if let Some(data_file) = &file.data_file {
            self.staging
                .write_data_file(&data_file.file_name, workbook, &project.uuid)
                .await?;
        }

        tracing::info!(project_uuid, file_uuid = %file.uuid, "Spreadsheet staged");
        Ok(file)
    }

    /// Supplementary file document describing the workbook
    ///
    /// Versions and dates follow the project so the file is staged alongside
    /// it. The file and data-file uuids derive from the project and export job.
    pub async fn file_metadata(
        &self,
        workbook: &[u8],
        project: &MetadataNode,
        export_job_id: &ExportJobId,
    ) -> Result<MetadataNode> {
        let schema = self
            .staging
            .schemas()
            .latest(SchemaKind::SupplementaryFile)
            .await?;
        let file_name = format!("metadata_{}.xlsx", project.uuid);
        let (file_uuid, data_file_uuid) = spreadsheet_uuids(&project.uuid, export_job_id);

        let content = json!({
            "describedBy": schema.url,
            "schema_type": "file",
            "file_core": {
                "file_name": file_name,
                "format": "xlsx",
                "file_source": "DCP/2 Ingest",
                "content_description": [{
                    "text": "metadata spreadsheet",
                    "ontology": "data:2193",
                    "ontology_label": "Database entry metadata"
                }]
            }
        });
        self.staging
            .schemas()
            .validate(SchemaKind::SupplementaryFile, &content)?;

        let document = json!({
            "uuid": {"uuid": file_uuid.to_string()},
            "type": "file",
            "dcpVersion": project.dcp_version,
            "submissionDate": project.provenance.submission_date,
            "updateDate": project.provenance.update_date,
            "fileName": file_name,
            "dataFileUuid": data_file_uuid.to_string(),
            "cloudUrl": Value::Null,
            "fileContentType": "xlsx",
            "size": workbook.len(),
            "checksums": {
                "sha256": hex::encode(Sha256::digest(workbook)),
                "sha1": hex::encode(Sha1::digest(workbook)),
                "crc32c": format!("{:08x}", crc32c::crc32c(workbook)),
                "s3_etag": "n/a - not in s3"
            },
            "content": content
        });
        MetadataNode::from_ingest_json(&document)
    }
}

/// Name-based uuids of the spreadsheet file and its data file
fn spreadsheet_uuids(project_uuid: &str, export_job_id: &ExportJobId) -> (Uuid, Uuid) {
    let name = format!("{project_uuid}/{export_job_id}/metadata-spreadsheet");
    let file = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes());
    (file, Uuid::new_v5(&file, b"data-file"))
}

pub struct SpreadsheetHandler {
    exporter: SpreadsheetExporter,
    tracker: Arc<ExportJobTracker>,
}

impl SpreadsheetHandler {
    pub fn new(exporter: SpreadsheetExporter, tracker: Arc<ExportJobTracker>) -> Self {
        Self { exporter, tracker }
    }

    async fn set_state(&self, id: &ExportJobId, state: TaskState) -> Result<()> {
        self.tracker
            .set_sub_state(id, SubStateDimension::SpreadsheetGeneration, state)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageHandler for SpreadsheetHandler {
    type Message = SpreadsheetMessage;

    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    fn context(&self, message: &SpreadsheetMessage) -> CorrelationContext {
        CorrelationContext::new()
            .submission(message.submission_uuid.clone())
            .export_job(message.export_job_id.as_str())
            .project(message.project_uuid.clone())
    }

    async fn guard(&self, message: &SpreadsheetMessage) -> Result<Guard> {
        let job = match active_job(&self.tracker, &message.export_job_id).await? {
            Ok(job) => job,
            Err(skip) => return Ok(skip),
        };
        if job.spreadsheet_generation == TaskState::Complete {
            return Ok(Guard::Skip("spreadsheet already generated".to_string()));
        }
        Ok(Guard::Proceed)
    }

    async fn handle(&self, message: &SpreadsheetMessage) -> Result<()> {
        self.set_state(&message.export_job_id, TaskState::Started).await?;
        self.exporter
            .export(
                &message.export_job_id,
                &message.submission_uuid,
                &message.project_uuid,
            )
            .await?;
        self.set_state(&message.export_job_id, TaskState::Complete).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::ObjectStore;
    use crate::core::export::fixtures::{world, World};
    use crate::domain::ExporterError;
    use crate::gateway::{Dispatch, HandlerOutcome};

    struct FixedWorkbook(Option<&'static [u8]>);

    #[async_trait]
    impl SpreadsheetGenerator for FixedWorkbook {
        async fn generate(&self, submission_uuid: &str) -> Result<Bytes> {
            self.0
                .map(Bytes::from_static)
                .ok_or_else(|| ExporterError::Other(format!("no workbook for {submission_uuid}")))
        }
    }

    fn handler(w: &World, workbook: Option<&'static [u8]>) -> SpreadsheetHandler {
        SpreadsheetHandler::new(
            SpreadsheetExporter::new(w.store.clone(), Arc::new(FixedWorkbook(workbook)), w.staging.clone()),
            w.tracker.clone(),
        )
    }

    fn body() -> Vec<u8> {
        json!({"exportJobId": "E1", "submissionUuid": "S1", "projectUuid": "PR1"})
            .to_string()
            .into_bytes()
    }

    #[tokio::test]
    async fn test_file_metadata_follows_project() {
        let w = world();
        let exporter = SpreadsheetExporter::new(w.store.clone(), Arc::new(FixedWorkbook(None)), w.staging.clone());

        let id = ExportJobId::new("E1").unwrap();

        let file = exporter.file_metadata(b"workbook", &w.project, &id).await.unwrap();

        let data_file = file.data_file.as_ref().unwrap();
        assert_eq!(data_file.file_name, "metadata_PR1.xlsx");
        assert_eq!(data_file.size, 8);
        assert_eq!(
            data_file.checksums.sha256.as_deref(),
            Some(hex::encode(Sha256::digest(b"workbook")).as_str())
        );
        assert_eq!(
            data_file.checksums.sha1.as_deref(),
            Some(hex::encode(Sha1::digest(b"workbook")).as_str())
        );
        let crc = data_file.checksums.crc32c.as_deref().unwrap();
        assert_eq!(crc, format!("{:08x}", crc32c::crc32c(b"workbook")));
        assert_eq!(crc.len(), 8);

        let again = exporter.file_metadata(b"other", &w.project, &id).await.unwrap();
        assert_eq!(again.uuid, file.uuid);
        assert_eq!(again.data_file.unwrap().data_file_uuid, data_file.data_file_uuid);
        let other_job = ExportJobId::new("E2").unwrap();
        let other = exporter.file_metadata(b"workbook", &w.project, &other_job).await.unwrap();
        assert_ne!(other.uuid, file.uuid);
        assert_eq!(file.dcp_version, w.project.dcp_version);
        assert_eq!(file.concrete_type(), "supplementary_file");
        assert_eq!(file.content["file_core"]["format"], "xlsx");
    }

    #[tokio::test]
    async fn test_spreadsheet_is_staged_and_marked_complete() {
        let w = world();
        let id = ExportJobId::new("E1").unwrap();

        let outcome = handler(&w, Some(b"xlsx-bytes")).dispatch(&body()).await.unwrap();

        assert_eq!(outcome, HandlerOutcome::Completed);
        let keys = w.objects.keys();
        assert!(keys.contains(&"PR1/data/metadata_PR1.xlsx".to_string()));
        assert!(keys.iter().any(|k| k.starts_with("PR1/metadata/supplementary_file/")));
        assert!(keys.iter().any(|k| k.starts_with("PR1/descriptors/supplementary_file/")));
        assert!(keys.iter().any(|k| k.starts_with("PR1/links/")));
        assert_eq!(
            w.store.export_job(&id).unwrap().spreadsheet_generation,
            TaskState::Complete
        );
    }

    #[tokio::test]
    async fn test_generation_failure_leaves_started() {
        let w = world();
        let id = ExportJobId::new("E1").unwrap();

        let err = handler(&w, None).dispatch(&body()).await.unwrap_err();

        assert!(matches!(err, ExporterError::Other(_)));
        assert_eq!(
            w.store.export_job(&id).unwrap().spreadsheet_generation,
            TaskState::Started
        );
        assert!(w.objects.keys().is_empty());
    }

    #[tokio::test]
    async fn test_generated_spreadsheet_is_skipped() {
        let w = world();
        let handler = handler(&w, Some(b"xlsx-bytes"));

        handler.dispatch(&body()).await.unwrap();
        let uploads = w.objects.upload_count();
        let outcome = handler.dispatch(&body()).await.unwrap();

        assert!(matches!(outcome, HandlerOutcome::Skipped(_)));
        assert_eq!(w.objects.upload_count(), uploads);
    }

    #[tokio::test]
    async fn test_rerun_converges_on_first_staged_spreadsheet() {
        let w = world();
        let id = ExportJobId::new("E1").unwrap();
        let first = SpreadsheetExporter::new(w.store.clone(), Arc::new(FixedWorkbook(Some(b"v1-bytes"))), w.staging.clone());
        let second = SpreadsheetExporter::new(
            w.store.clone(),
            Arc::new(FixedWorkbook(Some(b"v2-bytes-longer"))),
            w.staging.clone(),
        );

        first.export(&id, "S1", "PR1").await.unwrap();
        second.export(&id, "S1", "PR1").await.unwrap();

        let keys = w.objects.keys();
        let under = |prefix: &str| keys.iter().filter(|k| k.starts_with(prefix)).cloned().collect::<Vec<_>>();
        assert_eq!(under("PR1/metadata/supplementary_file/").len(), 1);
        assert_eq!(under("PR1/links/").len(), 1);
        let descriptors = under("PR1/descriptors/supplementary_file/");
        assert_eq!(descriptors.len(), 1);

        let staged = w.objects.get("PR1/data/metadata_PR1.xlsx").await.unwrap();
        assert_eq!(&staged[..], b"v1-bytes");
        let descriptor: Value = serde_json::from_slice(&w.objects.get(&descriptors[0]).await.unwrap()).unwrap();
        assert_eq!(descriptor["size"], staged.len());
        assert_eq!(descriptor["sha256"], hex::encode(Sha256::digest(&staged)));
    }
}
