//! Submission export: transfer a submission's data files to the staging area

use super::active_job;
use crate::adapters::metadata::MetadataStore;
use crate::config::TransferConfig;
use crate::core::backoff::{Attempt, Exhausted};
use crate::core::state::ExportJobTracker;
use crate::core::transfer::{transfer_job_spec, TransferCoordinator, TransferRole};
use crate::domain::{
    ExportJobId, ExporterError, MetadataError, Result, SubStateDimension, SubmissionExportMessage,
    TaskState, TransferJobName,
};
use crate::gateway::{CorrelationContext, Guard, MessageHandler};
use async_trait::async_trait;
use std::sync::Arc;

/// Submit action a submission must carry to be exported
pub const EXPORT_SUBMIT_ACTION: &str = "Export";

pub struct SubmissionExporter {
    store: Arc<dyn MetadataStore>,
    coordinator: Arc<TransferCoordinator>,
    tracker: Arc<ExportJobTracker>,
    config: TransferConfig,
}

impl SubmissionExporter {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        coordinator: Arc<TransferCoordinator>,
        tracker: Arc<ExportJobTracker>,
        config: TransferConfig,
    ) -> Self {
        Self {
            store,
            coordinator,
            tracker,
            config,
        }
    }

    /// Starts the data file transfer of a submission and, if configured,
    /// waits for it
    ///
    /// The worker that creates the transfer job polls the transfer service.
    /// A follower polls the export job instead, and falls back to the
    /// transfer service so a missed notification cannot strand it.
    pub async fn export(
        &self,
        export_job_id: &ExportJobId,
        submission_uuid: &str,
        project_uuid: &str,
    ) -> Result<TransferRole> {
        let submission = self
            .store
            .get_submission(submission_uuid)
            .await?
            .ok_or_else(|| MetadataError::not_found("submission", submission_uuid))?;
        if !submission.has_submit_action(EXPORT_SUBMIT_ACTION) {
            return Err(ExporterError::MissingSubmitAction {
                submission_uuid: submission_uuid.to_string(),
                action: EXPORT_SUBMIT_ACTION.to_string(),
            });
        }

        let spec = transfer_job_spec(&self.config, export_job_id, &submission, project_uuid)?;
        let role = self.coordinator.start_transfer(&spec).await?;
        self.tracker
            .set_sub_state(export_job_id, SubStateDimension::DataFileTransfer, TaskState::Started)
            .await?;

        if !self.config.await_completion {
            tracing::info!(
                export_job_id = %export_job_id,
                job_name = %spec.name,
                "Transfer started, completion left to the notification listener"
            );
            return Ok(role);
        }

        match role {
            TransferRole::Creator => {
                self.coordinator.wait_for_completion(&spec.name).await?;
                self.tracker.mark_transfer_complete(export_job_id).await?;
            }
            TransferRole::Follower => {
                self.follow(export_job_id, &spec.name).await?;
            }
        }
        Ok(role)
    }

    /// Polls until the export job's data file transfer is COMPLETE
    ///
    /// # Errors
    ///
    /// Returns `ExporterError::TransferWaitTimeout` once the poll deadline
    /// passes, or the first lookup error.
    pub async fn follow(&self, export_job_id: &ExportJobId, job_name: &TransferJobName) -> Result<()> {
        tracing::info!(export_job_id = %export_job_id, %job_name, "Waiting for transfer owned by another worker");

        let outcome = self
            .coordinator
            .poll_backoff()
            .run(|| async move {
                match self.transfer_finished(export_job_id, job_name).await {
                    Ok(true) => Attempt::Done(Ok(())),
                    Ok(false) => Attempt::Retry(()),
                    Err(e) => Attempt::Done(Err(e)),
                }
            })
            .await;

        match outcome {
            Ok(result) => result,
            Err(Exhausted::Deadline { waited, .. }) => Err(ExporterError::TransferWaitTimeout {
                job_name: job_name.to_string(),
                waited,
            }),
        }
    }

    async fn transfer_finished(
        &self,
        export_job_id: &ExportJobId,
        job_name: &TransferJobName,
    ) -> Result<bool> {
        let job = self
            .tracker
            .get_job(export_job_id)
            .await?
            .ok_or_else(|| MetadataError::not_found("exportJob", export_job_id.as_str()))?;
        if job.data_file_transfer == TaskState::Complete {
            return Ok(true);
        }

        if self.coordinator.is_complete(job_name).await? {
            self.tracker.mark_transfer_complete(export_job_id).await?;
            return Ok(true);
        }
        Ok(false)
    }
}

pub struct SubmissionHandler {
    exporter: SubmissionExporter,
    tracker: Arc<ExportJobTracker>,
}

impl SubmissionHandler {
    pub fn new(exporter: SubmissionExporter, tracker: Arc<ExportJobTracker>) -> Self {
        Self { exporter, tracker }
    }
}

#[async_trait]
impl MessageHandler for SubmissionHandler {
    type Message = SubmissionExportMessage;

    fn name(&self) -> &'static str {
        "submission"
    }

    fn context(&self, message: &SubmissionExportMessage) -> CorrelationContext {
        CorrelationContext::new()
            .submission(message.submission_uuid.clone())
            .export_job(message.export_job_id.as_str())
            .project(message.project_uuid.clone())
    }

    async fn guard(&self, message: &SubmissionExportMessage) -> Result<Guard> {
        let job = match active_job(&self.tracker, &message.export_job_id).await? {
            Ok(job) => job,
            Err(skip) => return Ok(skip),
        };
        if job.data_file_transfer == TaskState::Complete {
            return Ok(Guard::Skip("data files already transferred".to_string()));
        }
        Ok(Guard::Proceed)
    }

    async fn handle(&self, message: &SubmissionExportMessage) -> Result<()> {
        self.exporter
            .export(
                &message.export_job_id,
                &message.submission_uuid,
                &message.project_uuid,
            )
            .await?;
        Ok(())
    }
}
