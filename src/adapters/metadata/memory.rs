//! In-memory metadata store
//!
//! Holds documents, relations, submissions and export jobs in maps. Patches
//! are applied to the stored jobs and also recorded so tests can assert on
//! the exact sequence of writes.

use super::{MetadataStore, SchemaKind, SchemaRef};
use crate::domain::metadata::EntityKind;
use crate::domain::{
    ExportJob, ExportJobId, ExportJobPatch, ExporterError, MetadataError, MetadataNode, Relation,
    Result, Submission, SubStateDimension,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    entities: HashMap<(EntityKind, String), MetadataNode>,
    relations: HashMap<(Relation, String), Vec<(EntityKind, String)>>,
    submissions: HashMap<String, Submission>,
    jobs: HashMap<ExportJobId, ExportJob>,
    patches: Vec<(ExportJobId, ExportJobPatch)>,
    export_entities: HashMap<ExportJobId, Vec<String>>,
    schemas: HashMap<SchemaKind, SchemaRef>,
    manifests: Vec<Value>,
}

/// Thread-safe in-memory [`MetadataStore`]
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    state: Mutex<State>,
    entity_reads: AtomicUsize,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| ExporterError::Other("metadata store lock poisoned".to_string()))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> Option<R> {
        self.state.lock().ok().map(|mut state| f(&mut state))
    }

    pub fn insert_entity(&self, node: MetadataNode) {
        self.with_state(|state| {
            state.entities.insert((node.kind, node.uuid.clone()), node);
        });
    }

    /// Records that `from` reaches `to` through `relation`
    pub fn relate(&self, from: &MetadataNode, relation: Relation, to: &MetadataNode) {
        self.with_state(|state| {
            let targets = state
                .relations
                .entry((relation, from.uuid.clone()))
                .or_default();
            let target = (to.kind, to.uuid.clone());
            if !targets.contains(&target) {
                targets.push(target);
            }
        });
    }

    pub fn insert_submission(&self, submission: Submission) {
        self.with_state(|state| {
            state
                .submissions
                .insert(submission.uuid.clone(), submission);
        });
    }

    pub fn insert_export_job(&self, job: ExportJob) {
        self.with_state(|state| {
            state.jobs.insert(job.job_id.clone(), job);
        });
    }

    pub fn insert_schema(&self, kind: SchemaKind, schema: SchemaRef) {
        self.with_state(|state| {
            state.schemas.insert(kind, schema);
        });
    }

    /// Current copy of a stored job
    pub fn export_job(&self, id: &ExportJobId) -> Option<ExportJob> {
        self.with_state(|state| state.jobs.get(id).cloned()).flatten()
    }

    /// Every patch applied so far, in order
    pub fn patches(&self) -> Vec<(ExportJobId, ExportJobPatch)> {
        self.with_state(|state| state.patches.clone())
            .unwrap_or_default()
    }

    /// Entity ids recorded for a job, duplicates included
    pub fn export_entities(&self, id: &ExportJobId) -> Vec<String> {
        self.with_state(|state| state.export_entities.get(id).cloned().unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn manifests(&self) -> Vec<Value> {
        self.with_state(|state| state.manifests.clone())
            .unwrap_or_default()
    }

    /// Number of `get_entity` calls served
    pub fn entity_reads(&self) -> usize {
        self.entity_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get_entity(&self, kind: EntityKind, uuid: &str) -> Result<MetadataNode> {
        self.entity_reads.fetch_add(1, Ordering::SeqCst);
        self.lock()?
            .entities
            .get(&(kind, uuid.to_string()))
            .cloned()
            .ok_or_else(|| MetadataError::not_found(kind.to_string(), uuid).into())
    }

    async fn get_related_entities(
        &self,
        relation: Relation,
        of: &MetadataNode,
    ) -> Result<Vec<MetadataNode>> {
        let state = self.lock()?;
        let targets = match state.relations.get(&(relation, of.uuid.clone())) {
            Some(targets) => targets,
            None => return Ok(Vec::new()),
        };
        targets
            .iter()
            .map(|key| {
                state
                    .entities
                    .get(key)
                    .cloned()
                    .ok_or_else(|| {
                        ExporterError::from(MetadataError::not_found(key.0.to_string(), &key.1))
                    })
            })
            .collect()
    }

    async fn get_submission(&self, uuid: &str) -> Result<Option<Submission>> {
        Ok(self.lock()?.submissions.get(uuid).cloned())
    }

    async fn get_export_job(&self, id: &ExportJobId) -> Result<Option<ExportJob>> {
        Ok(self.lock()?.jobs.get(id).cloned())
    }

    async fn patch_export_job(&self, id: &ExportJobId, patch: ExportJobPatch) -> Result<()> {
        let mut state = self.lock()?;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| MetadataError::not_found("exportJob", id.as_str()))?;
        match patch {
            ExportJobPatch::State(next) => job.state = next,
            ExportJobPatch::SubState(SubStateDimension::DataFileTransfer, next) => {
                job.data_file_transfer = next
            }
            ExportJobPatch::SubState(SubStateDimension::SpreadsheetGeneration, next) => {
                job.spreadsheet_generation = next
            }
        }
        state.patches.push((id.clone(), patch));
        Ok(())
    }

    async fn get_latest_schema(&self, kind: SchemaKind) -> Result<SchemaRef> {
        self.lock()?
            .schemas
            .get(&kind)
            .cloned()
            .ok_or_else(|| MetadataError::not_found("schema", kind.concrete_entity()).into())
    }

    async fn create_export_entity(&self, id: &ExportJobId, entity_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        if !state.jobs.contains_key(id) {
            return Err(MetadataError::not_found("exportJob", id.as_str()).into());
        }
        state
            .export_entities
            .entry(id.clone())
            .or_default()
            .push(entity_id.to_string());
        Ok(())
    }

    async fn count_completed_entities(&self, id: &ExportJobId) -> Result<u64> {
        let state = self.lock()?;
        let distinct: BTreeSet<&String> = state
            .export_entities
            .get(id)
            .map(|ids| ids.iter().collect())
            .unwrap_or_default();
        Ok(distinct.len() as u64)
    }

    async fn export_entity_exists(&self, id: &ExportJobId, entity_id: &str) -> Result<bool> {
        Ok(self
            .lock()?
            .export_entities
            .get(id)
            .is_some_and(|ids| ids.iter().any(|e| e == entity_id)))
    }

    async fn create_bundle_manifest(&self, manifest: &Value) -> Result<()> {
        self.lock()?.manifests.push(manifest.clone());
        Ok(())
    }
}
