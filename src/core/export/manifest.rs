//! Assay manifest export
//!
//! A manifest lists every metadata document of one assay's experiment graph,
//! grouped by entity kind, plus the uuids of the data files it references.

use super::project_of;
use crate::adapters::metadata::MetadataStore;
use crate::core::graph::{ExperimentGraph, GraphCrawler};
use crate::domain::{EntityKind, ManifestMessage, Result};
use crate::gateway::{CorrelationContext, Guard, MessageHandler};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

type UuidMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssayManifest {
    pub bundle_uuid: String,
    pub envelope_uuid: String,
    pub data_files: Vec<String>,
    pub file_project_map: UuidMap,
    pub file_biomaterial_map: UuidMap,
    pub file_process_map: UuidMap,
    pub file_protocol_map: UuidMap,
    pub file_files_map: UuidMap,
}

impl AssayManifest {
    pub fn from_graph(process_uuid: &str, envelope_uuid: &str, graph: &ExperimentGraph) -> Self {
        let mut manifest = Self {
            bundle_uuid: process_uuid.to_string(),
            envelope_uuid: envelope_uuid.to_string(),
            ..Self::default()
        };

        for node in graph.nodes.nodes() {
            let map = match node.kind {
                EntityKind::Project => &mut manifest.file_project_map,
                EntityKind::Biomaterial => &mut manifest.file_biomaterial_map,
                EntityKind::Process => &mut manifest.file_process_map,
                EntityKind::Protocol => &mut manifest.file_protocol_map,
                EntityKind::File => &mut manifest.file_files_map,
            };
            map.insert(node.uuid.clone(), vec![node.uuid.clone()]);
            if let Some(data_file) = &node.data_file {
                manifest.data_files.push(data_file.data_file_uuid.clone());
            }
        }
        manifest.data_files.sort();
        manifest
    }
}

pub struct ManifestExporter {
    store: Arc<dyn MetadataStore>,
    crawler: GraphCrawler,
}

impl ManifestExporter {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            crawler: GraphCrawler::new(store.clone()),
            store,
        }
    }

    pub async fn generate(&self, process_uuid: &str, envelope_uuid: &str) -> Result<AssayManifest> {
        let process = self.store.get_entity(EntityKind::Process, process_uuid).await?;
        let project = project_of(self.store.as_ref(), &process).await?;
        let graph = self.crawler.build_graph(&process, &project).await?;
        Ok(AssayManifest::from_graph(process_uuid, envelope_uuid, &graph))
    }

    /// Generates the manifest of an assay and stores it in the metadata store
    pub async fn export(&self, process_uuid: &str, envelope_uuid: &str) -> Result<AssayManifest> {
        let manifest = self.generate(process_uuid, envelope_uuid).await?;
        self.store
            .create_bundle_manifest(&serde_json::to_value(&manifest)?)
            .await?;
        tracing::info!(
            process_uuid,
            data_files = manifest.data_files.len(),
            "Assay manifest created"
        );
        Ok(manifest)
    }
}

pub struct ManifestHandler {
    exporter: ManifestExporter,
}

impl ManifestHandler {
    pub fn new(exporter: ManifestExporter) -> Self {
        Self { exporter }
    }
}

#[async_trait]
impl MessageHandler for ManifestHandler {
    type Message = ManifestMessage;

    fn name(&self) -> &'static str {
        "manifest"
    }

    fn context(&self, message: &ManifestMessage) -> CorrelationContext {
        CorrelationContext::new()
            .submission(message.envelope_uuid.clone())
            .document(message.document_uuid.clone())
            .index(message.index, message.total)
    }

    /// Manifests carry no export job, so there is nothing to be stale against
    async fn guard(&self, _message: &ManifestMessage) -> Result<Guard> {
        Ok(Guard::Proceed)
    }

    async fn handle(&self, message: &ManifestMessage) -> Result<()> {
        self.exporter
            .export(&message.document_uuid, &message.envelope_uuid)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::export::fixtures::world;
    use crate::gateway::{Dispatch, HandlerOutcome};
    use serde_json::json;

    #[tokio::test]
    async fn test_manifest_groups_graph_by_kind() {
        let w = world();
        let exporter = ManifestExporter::new(w.store.clone());

        let manifest = exporter.generate("P1", "S1").await.unwrap();

        assert_eq!(manifest.bundle_uuid, "P1");
        assert_eq!(manifest.envelope_uuid, "S1");
        assert_eq!(manifest.data_files, vec!["data-F1"]);
        assert_eq!(manifest.file_project_map["PR1"], vec!["PR1"]);
        assert_eq!(manifest.file_process_map["P1"], vec!["P1"]);
        assert!(manifest.file_biomaterial_map.contains_key("B1"));
        assert!(manifest.file_files_map.contains_key("F1"));
        assert!(manifest.file_protocol_map.is_empty());
    }

    #[tokio::test]
    async fn test_handler_stores_manifest() {
        let w = world();
        let handler = ManifestHandler::new(ManifestExporter::new(w.store.clone()));
        let body = json!({
            "documentUuid": "P1",
            "envelopeUuid": "S1",
            "callbackLink": "/processes/P1",
            "index": 0,
            "total": 1
        });

        let outcome = handler.dispatch(body.to_string().as_bytes()).await.unwrap();

        assert_eq!(outcome, HandlerOutcome::Completed);
        let manifests = w.store.manifests();
        assert_eq!(manifests.len(), 1);
        assert_eq!(manifests[0]["bundleUuid"], "P1");
        assert_eq!(manifests[0]["fileFilesMap"]["F1"], json!(["F1"]));
        assert!(w.objects.keys().is_empty());
    }
}
