//! Units of work behind each consumed message
//!
//! - [`experiment`] stages one assay's metadata graph and records the assay
//!   against its export job
//! - [`submission`] transfers a submission's data files into the staging area
//! - [`spreadsheet`] generates and stages the project spreadsheet
//! - [`manifest`] builds the assay manifest of one process

pub mod experiment;
pub mod manifest;
pub mod spreadsheet;
pub mod submission;

pub use experiment::{ExperimentExporter, ExperimentHandler};
pub use manifest::{AssayManifest, ManifestExporter, ManifestHandler};
pub use spreadsheet::{SpreadsheetExporter, SpreadsheetGenerator, SpreadsheetHandler};
pub use submission::{SubmissionExporter, SubmissionHandler};

use crate::adapters::metadata::MetadataStore;
use crate::core::state::ExportJobTracker;
use crate::domain::{ExportJob, ExportJobId, MetadataError, MetadataNode, Relation, Result};
use crate::gateway::Guard;

/// Looks up an export job for the staleness guard
///
/// A job that no longer exists, or whose submission has been deleted, is a
/// skip; otherwise the current job is returned for further checks.
pub(crate) async fn active_job(
    tracker: &ExportJobTracker,
    id: &ExportJobId,
) -> Result<std::result::Result<ExportJob, Guard>> {
    let Some(job) = tracker.get_job(id).await? else {
        return Ok(Err(Guard::Skip(format!("export job {id} does not exist"))));
    };
    if job.is_submission_deleted() {
        return Ok(Err(Guard::Skip(format!(
            "submission of export job {id} has been deleted"
        ))));
    }
    Ok(Ok(job))
}

/// The project a process belongs to
///
/// # Errors
///
/// Returns `MetadataError::NotFound` if the process has no project.
pub(crate) async fn project_of(store: &dyn MetadataStore, process: &MetadataNode) -> Result<MetadataNode> {
    store
        .get_related_entities(Relation::Projects, process)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| MetadataError::not_found("project of process", process.uuid.as_str()).into())
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Metadata shared by the export tests: project PR1, assay process P1
    //! consuming specimen B1 into sequence file F1, export job E1 of
    //! submission S1.

    use crate::adapters::metadata::{MemoryMetadataStore, SchemaKind, SchemaRef};
    use crate::adapters::storage::MemoryObjectStore;
    use crate::core::backoff::ExponentialBackoff;
    use crate::core::staging::{RequiredFieldsValidator, SchemaService, StagingArea, StagingWriter};
    use crate::core::state::ExportJobTracker;
    use crate::domain::metadata::fixtures::{document, file_document};
    use crate::domain::{
        ExportJob, ExportJobId, ExportJobState, MetadataNode, Relation, Submission, TaskState,
    };
    use std::sync::Arc;
    use std::time::Duration;

    pub struct World {
        pub store: Arc<MemoryMetadataStore>,
        pub objects: Arc<MemoryObjectStore>,
        pub staging: Arc<StagingArea>,
        pub tracker: Arc<ExportJobTracker>,
        pub project: MetadataNode,
        pub process: MetadataNode,
    }

    pub fn node(doc: serde_json::Value) -> MetadataNode {
        MetadataNode::from_ingest_json(&doc).unwrap()
    }

    pub fn export_job(id: &str, submission: &str, expected: u64) -> ExportJob {
        ExportJob {
            job_id: ExportJobId::new(id).unwrap(),
            submission_id: submission.to_string(),
            created_date: None,
            updated_date: None,
            state: ExportJobState::Exporting,
            expected_entity_count: expected,
            data_file_transfer: TaskState::NotStarted,
            spreadsheet_generation: TaskState::NotStarted,
        }
    }

    pub fn world() -> World {
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
        store.insert_schema(
            SchemaKind::SupplementaryFile,
            SchemaRef {
                url: "https://schema.example.org/type/file/2.2.0/supplementary_file".to_string(),
                version: "2.2.0".to_string(),
            },
        );

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

        let objects = Arc::new(MemoryObjectStore::new());
        let writer = StagingWriter::with_backoff(
            objects.clone(),
            ExponentialBackoff::new(Duration::from_millis(10), None, Duration::from_secs(1)),
            ExponentialBackoff::new(Duration::from_millis(10), None, Duration::from_secs(1)),
        );
        let schemas = Arc::new(SchemaService::new(
            store.clone(),
            Arc::new(RequiredFieldsValidator),
            Duration::from_secs(300),
        ));
        let staging = Arc::new(StagingArea::new(writer, schemas, ""));
        let tracker = Arc::new(ExportJobTracker::new(store.clone()));

        World {
            store,
            objects,
            staging,
            tracker,
            project,
            process,
        }
    }
}
