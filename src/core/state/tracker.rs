//! Export job progress tracking
//!
//! The tracker is the only component that advances an export job. Completion
//! is re-checked with a fresh read of the expected and completed counts on
//! every recorded entity; two racing callers may both issue the EXPORTED
//! transition, which the store treats as a no-op.

use crate::adapters::metadata::MetadataStore;
use crate::domain::{
    ExportJob, ExportJobId, ExportJobPatch, ExportJobState, MetadataError, Result,
    SubStateDimension, TaskState,
};
use std::sync::Arc;

pub struct ExportJobTracker {
    store: Arc<dyn MetadataStore>,
}

impl ExportJobTracker {
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// The export job, `None` if it does not exist in this environment
    pub async fn get_job(&self, id: &ExportJobId) -> Result<Option<ExportJob>> {
        self.store.get_export_job(id).await
    }

    /// Whether `entity_id` has already been recorded as completed
    pub async fn is_entity_recorded(&self, id: &ExportJobId, entity_id: &str) -> Result<bool> {
        self.store.export_entity_exists(id, entity_id).await
    }

    /// Records one completed entity and re-checks job completion
    ///
    /// # Returns
    ///
    /// `true` if this call found the job complete and issued the EXPORTED
    /// transition.
    ///
    /// # Errors
    ///
    /// Returns `MetadataError::NotFound` if the job disappeared after the
    /// entity was recorded.
    pub async fn record_completed_entity(&self, id: &ExportJobId, entity_id: &str) -> Result<bool> {
        self.store.create_export_entity(id, entity_id).await?;

        let job = self
            .store
            .get_export_job(id)
            .await?
            .ok_or_else(|| MetadataError::not_found("exportJob", id.as_str()))?;
        let completed = self.store.count_completed_entities(id).await?;

        tracing::debug!(
            export_job_id = %id,
            entity_id,
            completed,
            expected = job.expected_entity_count,
            "Recorded completed entity"
        );

        if completed != job.expected_entity_count {
            return Ok(false);
        }
        if job.state != ExportJobState::Exporting {
            tracing::debug!(export_job_id = %id, state = %job.state, "Job already left EXPORTING");
            return Ok(false);
        }

        self.store
            .patch_export_job(id, ExportJobPatch::State(ExportJobState::Exported))
            .await?;
        tracing::info!(
            export_job_id = %id,
            entity_count = completed,
            "All entities exported, job marked EXPORTED"
        );
        Ok(true)
    }

    /// Moves one sub-state dimension forward
    ///
    /// A write that would not move the dimension forward is skipped, so
    /// sub-states never regress. Returns whether a patch was issued.
    pub async fn set_sub_state(
        &self,
        id: &ExportJobId,
        dimension: SubStateDimension,
        state: TaskState,
    ) -> Result<bool> {
        if let Some(job) = self.store.get_export_job(id).await? {
            let current = job.sub_state(dimension);
            if current >= state {
                tracing::debug!(
                    export_job_id = %id,
                    %dimension,
                    %current,
                    requested = %state,
                    "Sub-state already at or past requested state"
                );
                return Ok(false);
            }
        }

        self.store
            .patch_export_job(id, ExportJobPatch::SubState(dimension, state))
            .await?;
        tracing::info!(export_job_id = %id, %dimension, %state, "Export job sub-state updated");
        Ok(true)
    }

    /// Marks the data file transfer COMPLETE; idempotent
    pub async fn mark_transfer_complete(&self, id: &ExportJobId) -> Result<bool> {
        self.set_sub_state(id, SubStateDimension::DataFileTransfer, TaskState::Complete)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::metadata::MemoryMetadataStore;

    fn job(id: &str, expected: u64) -> ExportJob {
        ExportJob {
            job_id: ExportJobId::new(id).unwrap(),
            submission_id: "S1".to_string(),
            created_date: None,
            updated_date: None,
            state: ExportJobState::Exporting,
            expected_entity_count: expected,
            data_file_transfer: TaskState::NotStarted,
            spreadsheet_generation: TaskState::NotStarted,
        }
    }

    fn setup(expected: u64) -> (Arc<MemoryMetadataStore>, ExportJobTracker, ExportJobId) {
        let store = Arc::new(MemoryMetadataStore::new());
        store.insert_export_job(job("E1", expected));
        let tracker = ExportJobTracker::new(store.clone());
        (store, tracker, ExportJobId::new("E1").unwrap())
    }

    #[tokio::test]
    async fn test_job_exported_when_count_reaches_expected() {
        let (store, tracker, id) = setup(2);

        assert!(!tracker.record_completed_entity(&id, "D1").await.unwrap());
        assert_eq!(store.export_job(&id).unwrap().state, ExportJobState::Exporting);

        assert!(tracker.record_completed_entity(&id, "D2").await.unwrap());
        assert_eq!(store.export_job(&id).unwrap().state, ExportJobState::Exported);
    }

    #[tokio::test]
    async fn test_duplicate_entity_does_not_complete_job() {
        let (store, tracker, id) = setup(2);

        tracker.record_completed_entity(&id, "D1").await.unwrap();
        tracker.record_completed_entity(&id, "D1").await.unwrap();

        assert_eq!(store.export_job(&id).unwrap().state, ExportJobState::Exporting);
    }

    #[tokio::test]
    async fn test_exported_job_is_not_patched_again() {
        let (store, tracker, id) = setup(1);

        tracker.record_completed_entity(&id, "D1").await.unwrap();
        let patches = store.patches().len();
        assert!(!tracker.record_completed_entity(&id, "D1").await.unwrap());

        assert_eq!(store.patches().len(), patches);
        assert_eq!(store.export_job(&id).unwrap().state, ExportJobState::Exported);
    }

    #[tokio::test]
    async fn test_sub_state_never_regresses() {
        let (store, tracker, id) = setup(1);
        let dim = SubStateDimension::SpreadsheetGeneration;

        assert!(tracker.set_sub_state(&id, dim, TaskState::Complete).await.unwrap());
        assert!(!tracker.set_sub_state(&id, dim, TaskState::Started).await.unwrap());

        assert_eq!(store.export_job(&id).unwrap().spreadsheet_generation, TaskState::Complete);
        assert_eq!(
            store.export_job(&id).unwrap().data_file_transfer,
            TaskState::NotStarted
        );
    }

    #[tokio::test]
    async fn test_mark_transfer_complete_is_idempotent() {
        let (store, tracker, id) = setup(1);

        assert!(tracker.mark_transfer_complete(&id).await.unwrap());
        assert!(!tracker.mark_transfer_complete(&id).await.unwrap());

        assert_eq!(store.patches().len(), 1);
        assert_eq!(store.export_job(&id).unwrap().data_file_transfer, TaskState::Complete);
    }

    #[tokio::test]
    async fn test_unknown_job_fails_record() {
        let store = Arc::new(MemoryMetadataStore::new());
        let tracker = ExportJobTracker::new(store);
        let id = ExportJobId::new("missing").unwrap();

        assert!(tracker.record_completed_entity(&id, "D1").await.is_err());
    }
}
