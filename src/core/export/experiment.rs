//! Experiment export: stage one assay's metadata graph

use super::{active_job, project_of};
use crate::adapters::metadata::MetadataStore;
use crate::core::graph::{ExperimentGraph, GraphCrawler};
use crate::core::staging::StagingArea;
use crate::core::state::ExportJobTracker;
use crate::domain::{EntityKind, ExperimentMessage, Result};
use crate::gateway::{CorrelationContext, Guard, MessageHandler};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ExperimentExporter {
    store: Arc<dyn MetadataStore>,
    crawler: GraphCrawler,
    staging: Arc<StagingArea>,
}

impl ExperimentExporter {
    pub fn new(store: Arc<dyn MetadataStore>, staging: Arc<StagingArea>) -> Self {
        Self {
            crawler: GraphCrawler::new(store.clone()),
            store,
            staging,
        }
    }

    /// Crawls the experiment of `process_uuid` and stages it under its project
    ///
    /// Nothing is written unless the whole graph was crawled.
    pub async fn export(&self, process_uuid: &str) -> Result<ExperimentGraph> {
        let process = self.store.get_entity(EntityKind::Process, process_uuid).await?;
        let project = project_of(self.store.as_ref(), &process).await?;

        let graph = self.crawler.build_graph(&process, &project).await?;
        self.staging.write_graph(&graph, &process, &project.uuid).await?;
        self.staging.write_staging_area_json(&project.uuid).await?;

        tracing::info!(
            process_uuid,
            project_uuid = %project.uuid,
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "Experiment staged"
        );
        Ok(graph)
    }
}

pub struct ExperimentHandler {
    exporter: ExperimentExporter,
    tracker: Arc<ExportJobTracker>,
}

impl ExperimentHandler {
    pub fn new(exporter: ExperimentExporter, tracker: Arc<ExportJobTracker>) -> Self {
        Self { exporter, tracker }
    }
}

#[async_trait]
impl MessageHandler for ExperimentHandler {
    type Message = ExperimentMessage;

    fn name(&self) -> &'static str {
        "experiment"
    }

    fn context(&self, message: &ExperimentMessage) -> CorrelationContext {
        let context = CorrelationContext::new()
            .submission(message.envelope_uuid.clone())
            .export_job(message.export_job_id.as_str())
            .document(message.document_uuid.clone())
            .index(message.index, message.total);
        match &message.project_uuid {
            Some(project) => context.project(project.clone()),
            None => context,
        }
    }

    async fn guard(&self, message: &ExperimentMessage) -> Result<Guard> {
        if let Err(skip) = active_job(&self.tracker, &message.export_job_id).await? {
            return Ok(skip);
        }
        if self
            .tracker
            .is_entity_recorded(&message.export_job_id, &message.document_id)
            .await?
        {
            return Ok(Guard::Skip(format!(
                "assay {} already exported",
                message.document_id
            )));
        }
        Ok(Guard::Proceed)
    }

    async fn handle(&self, message: &ExperimentMessage) -> Result<()> {
        self.exporter.export(&message.document_uuid).await?;
        self.tracker
            .record_completed_entity(&message.export_job_id, &message.document_id)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::export::fixtures::{export_job, world, World};
    use crate::domain::{ExportJobId, ExportJobState, ExporterError};
    use crate::gateway::{Dispatch, HandlerOutcome};
    use serde_json::json;

    fn handler(w: &World) -> ExperimentHandler {
        ExperimentHandler::new(
            ExperimentExporter::new(w.store.clone(), w.staging.clone()),
            w.tracker.clone(),
        )
    }

    fn body(document_id: &str, export_job_id: &str) -> Vec<u8> {
        json!({
            "documentId": document_id,
            "documentUuid": "P1",
            "envelopeUuid": "S1",
            "index": 3,
            "total": 5,
            "exportJobId": export_job_id
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_export_stages_graph_under_project() {
        let w = world();
        let exporter = ExperimentExporter::new(w.store.clone(), w.staging.clone());

        let graph = exporter.export("P1").await.unwrap();

        assert_eq!(graph.nodes.len(), 4);
        let keys = w.objects.keys();
        let version = &w.process.dcp_version;
        assert!(keys.contains(&format!("PR1/metadata/process/P1_{version}.json")));
        assert!(keys.contains(&format!("PR1/links/P1_{version}_PR1.json")));
        assert!(keys.iter().any(|k| k.starts_with("PR1/descriptors/sequence_file/F1_")));
        assert!(keys.contains(&"PR1/staging_area.json".to_string()));
    }

    #[tokio::test]
    async fn test_process_without_project_fails() {
        let w = world();
        let orphan = crate::core::export::fixtures::node(
            crate::domain::metadata::fixtures::document("Process", "P9", "process", "9.2.0"),
        );
        w.store.insert_entity(orphan);
        let exporter = ExperimentExporter::new(w.store.clone(), w.staging.clone());

        let err = exporter.export("P9").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(w.objects.keys().is_empty());
    }

    #[tokio::test]
    async fn test_last_assay_marks_job_exported() {
        let w = world();
        let id = ExportJobId::new("E1").unwrap();
        for assay in ["D2", "D3", "D4", "D5"] {
            w.store.create_export_entity(&id, assay).await.unwrap();
        }

        let outcome = handler(&w).dispatch(&body("D1", "E1")).await.unwrap();

        assert_eq!(outcome, HandlerOutcome::Completed);
        assert_eq!(w.store.export_entities(&id).len(), 5);
        assert_eq!(w.store.export_job(&id).unwrap().state, ExportJobState::Exported);
    }

    #[tokio::test]
    async fn test_replay_is_skipped() {
        let w = world();
        let handler = handler(&w);
        let id = ExportJobId::new("E1").unwrap();

        handler.dispatch(&body("D1", "E1")).await.unwrap();
        let uploads = w.objects.upload_count();
        let outcome = handler.dispatch(&body("D1", "E1")).await.unwrap();

        assert!(matches!(outcome, HandlerOutcome::Skipped(_)));
        assert_eq!(w.objects.upload_count(), uploads);
        assert_eq!(w.store.export_entities(&id), vec!["D1"]);
        assert_eq!(w.store.export_job(&id).unwrap().state, ExportJobState::Exporting);
    }

    #[tokio::test]
    async fn test_stale_jobs_are_skipped() {
        let w = world();
        w.store.insert_export_job(export_job("E2", "", 1));

        for job in ["E2", "missing"] {
            let outcome = handler(&w).dispatch(&body("D1", job)).await.unwrap();
            assert!(matches!(outcome, HandlerOutcome::Skipped(_)), "{job}");
        }
        assert!(w.objects.keys().is_empty());
    }

    #[tokio::test]
    async fn test_missing_document_uuid_is_parse_error() {
        let w = world();
        let body = json!({"documentId": "D1", "envelopeUuid": "S1", "index": 3, "total": 5, "exportJobId": "E1"});

        let err = handler(&w)
            .dispatch(body.to_string().as_bytes())
            .await
            .unwrap_err();
        assert!(matches!(err, ExporterError::Parse(_)));
    }
}
