//! Staging area document layout
//!
//! Everything for project `P` lives under `{key_prefix}/P/`:
//!
//! | Key                                            | Content                       |
//! |------------------------------------------------|-------------------------------|
//! | `metadata/{concrete_type}/{uuid}_{version}.json`    | content with provenance  |
//! | `descriptors/{concrete_type}/{uuid}_{version}.json` | file descriptor          |
//! | `links/{process}_{version}_{P}.json`           | links of one experiment       |
//! | `data/{file_name}`                             | data file bytes               |
//! | `staging_area.json`                            | `{"is_delta": false}`         |

use super::descriptor::FileDescriptor;
use super::schema::SchemaService;
use super::writer::{StagingWriter, WriteOutcome};
use crate::adapters::metadata::SchemaKind;
use crate::core::graph::{ExperimentGraph, LinkSet};
use crate::domain::{EntityKind, MetadataNode, Result};
use bytes::Bytes;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use std::sync::Arc;

/// Upper bound on concurrent metadata writes within one export
const WRITE_CONCURRENCY: usize = 8;

pub struct StagingArea {
    writer: StagingWriter,
    schemas: Arc<SchemaService>,
    key_prefix: String,
    overwrite: bool,
}

impl StagingArea {
    pub fn new(writer: StagingWriter, schemas: Arc<SchemaService>, key_prefix: &str) -> Self {
        Self {
            writer,
            schemas,
            key_prefix: key_prefix.trim_matches('/').to_string(),
            overwrite: false,
        }
    }

    /// Replace existing objects instead of verifying them
    ///
    /// Only for an explicit re-export by a single known-current writer.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn writer(&self) -> &StagingWriter {
        &self.writer
    }

    pub fn schemas(&self) -> &SchemaService {
        &self.schemas
    }

    /// Full object key of a project-relative path
    pub fn key(&self, project_uuid: &str, path: &str) -> String {
        if self.key_prefix.is_empty() {
            format!("{project_uuid}/{path}")
        } else {
            format!("{}/{project_uuid}/{path}", self.key_prefix)
        }
    }

    pub fn metadata_key(&self, node: &MetadataNode, project_uuid: &str) -> String {
        self.key(
            project_uuid,
            &format!(
                "metadata/{}/{}_{}.json",
                node.concrete_type(),
                node.uuid,
                node.dcp_version
            ),
        )
    }

    pub fn descriptor_key(&self, node: &MetadataNode, project_uuid: &str) -> String {
        self.key(
            project_uuid,
            &format!(
                "descriptors/{}/{}_{}.json",
                node.concrete_type(),
                node.uuid,
                node.dcp_version
            ),
        )
    }

    pub fn links_key(&self, process_uuid: &str, process_version: &str, project_uuid: &str) -> String {
        self.key(
            project_uuid,
            &format!("links/{process_uuid}_{process_version}_{project_uuid}.json"),
        )
    }

    pub fn data_key(&self, file_name: &str, project_uuid: &str) -> String {
        self.key(project_uuid, &format!("data/{file_name}"))
    }

    /// Stages every node and the link set of an experiment graph
    ///
    /// `anchor` names the links document; it is the assay process for an
    /// experiment export.
    pub async fn write_graph(
        &self,
        graph: &ExperimentGraph,
        anchor: &MetadataNode,
        project_uuid: &str,
    ) -> Result<()> {
        self.write_metadatas(&graph.nodes.nodes(), project_uuid).await?;
        self.write_links(&graph.links, &anchor.uuid, &anchor.dcp_version, project_uuid)
            .await?;
        Ok(())
    }

    pub async fn write_metadatas(&self, nodes: &[MetadataNode], project_uuid: &str) -> Result<()> {
        let writes: Vec<BoxFuture<'_, Result<WriteOutcome>>> = nodes
            .iter()
            .map(|node| self.write_metadata(node, project_uuid).boxed())
            .collect();
        stream::iter(writes)
            .buffer_unordered(WRITE_CONCURRENCY)
            .try_collect::<Vec<_>>()
            .await?;
        tracing::debug!(project_uuid, count = nodes.len(), "Staged metadata documents");
        Ok(())
    }

    /// Stages a node's content, plus its descriptor if it is a file
    pub async fn write_metadata(&self, node: &MetadataNode, project_uuid: &str) -> Result<WriteOutcome> {
        let key = self.metadata_key(node, project_uuid);
        let outcome = self
            .write_json(&key, &node.content_with_provenance())
            .await?;
        tracing::debug!(uuid = %node.uuid, kind = %node.kind, key, "Staged metadata");

        if node.kind == EntityKind::File {
            self.write_file_descriptor(node, project_uuid).await?;
        }
        Ok(outcome)
    }

    pub async fn write_file_descriptor(&self, node: &MetadataNode, project_uuid: &str) -> Result<WriteOutcome> {
        let mut descriptor = FileDescriptor::from_node(node)?.to_json()?;
        self.schemas
            .stamp_and_validate(SchemaKind::FileDescriptor, &mut descriptor)
            .await?;

        let key = self.descriptor_key(node, project_uuid);
        tracing::info!(
            data_file_uuid = descriptor["file_id"].as_str().unwrap_or_default(),
            project_uuid,
            "Staging file descriptor"
        );
        self.write_json(&key, &descriptor).await
    }

    pub async fn write_links(
        &self,
        links: &LinkSet,
        process_uuid: &str,
        process_version: &str,
        project_uuid: &str,
    ) -> Result<WriteOutcome> {
        let mut document = links.to_json();
        if let Some(object) = document.as_object_mut() {
            object.insert("schema_type".to_string(), json!(SchemaKind::Links.concrete_entity()));
        }
        self.schemas
            .stamp_and_validate(SchemaKind::Links, &mut document)
            .await?;

        let key = self.links_key(process_uuid, process_version, project_uuid);
        self.write_json(&key, &document).await
    }

    pub async fn write_staging_area_json(&self, project_uuid: &str) -> Result<WriteOutcome> {
        let key = self.key(project_uuid, "staging_area.json");
        self.write_json(&key, &json!({ "is_delta": false })).await
    }

    pub async fn write_data_file(
        &self,
        file_name: &str,
        data: Bytes,
        project_uuid: &str,
    ) -> Result<WriteOutcome> {
        let key = self.data_key(file_name, project_uuid);
        self.writer.write(&key, data, self.overwrite).await
    }

    async fn write_json(&self, key: &str, document: &Value) -> Result<WriteOutcome> {
        let body = serde_json::to_vec(document)?;
        self.writer.write(key, Bytes::from(body), self.overwrite).await
    }
}
