//! Transfer job lifecycle: start and poll for completion
//!
//! Job names derive from the export job id, so every worker handling the
//! same export job creates the same job. The first create wins; every later
//! caller becomes a follower.

use crate::adapters::transfer::{OperationFilter, TransferCreation, TransferJobSpec, TransferService};
use crate::core::backoff::{Attempt, Exhausted, ExponentialBackoff};
use crate::domain::{ExporterError, Result, TransferJobName};
use std::sync::Arc;

/// Role of a worker after starting a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRole {
    /// This worker created the job
    Creator,
    /// The job already existed; another worker owns it
    Follower,
}

impl TransferRole {
    /// Whether this worker started the transfer that is now ongoing
    pub fn is_ongoing(&self) -> bool {
        matches!(self, TransferRole::Creator)
    }
}

pub struct TransferCoordinator {
    service: Arc<dyn TransferService>,
    project_id: String,
    poll_backoff: ExponentialBackoff,
}

impl TransferCoordinator {
    pub fn new(
        service: Arc<dyn TransferService>,
        project_id: impl Into<String>,
        poll_backoff: ExponentialBackoff,
    ) -> Self {
        Self {
            service,
            project_id: project_id.into(),
            poll_backoff,
        }
    }

    pub fn poll_backoff(&self) -> &ExponentialBackoff {
        &self.poll_backoff
    }

    /// Creates the transfer job
    ///
    /// # Errors
    ///
    /// Returns `ExporterError::TransferCouldNotStart` for any failure other
    /// than the job already existing.
    pub async fn start_transfer(&self, spec: &TransferJobSpec) -> Result<TransferRole> {
        match self.service.create_job(spec).await? {
            TransferCreation::Created => {
                tracing::info!(
                    job_name = %spec.name,
                    source_bucket = %spec.source.bucket,
                    source_path = %spec.source.path,
                    sink_path = %spec.sink.path,
                    "Transfer job created"
                );
                Ok(TransferRole::Creator)
            }
            TransferCreation::AlreadyExists => {
                tracing::info!(job_name = %spec.name, "Transfer job already exists, following");
                Ok(TransferRole::Follower)
            }
        }
    }

    /// Whether the job's latest operation has finished
    pub async fn is_complete(&self, job_name: &TransferJobName) -> Result<bool> {
        let filter = OperationFilter {
            project_id: self.project_id.clone(),
            job_name: job_name.clone(),
        };
        let operations = self.service.list_operations(&filter).await?;
        Ok(operations.first().is_some_and(|op| op.done))
    }

    /// Polls the job's operations until one reports done
    ///
    /// # Errors
    ///
    /// Returns `ExporterError::TransferWaitTimeout` once the poll deadline
    /// passes, or the first listing error.
    pub async fn wait_for_completion(&self, job_name: &TransferJobName) -> Result<()> {
        let outcome = self
            .poll_backoff
            .run(|| async move {
                match self.is_complete(job_name).await {
                    Ok(true) => Attempt::Done(Ok(())),
                    Ok(false) => {
                        tracing::debug!(%job_name, "Transfer still running");
                        Attempt::Retry(())
                    }
                    Err(e) => Attempt::Done(Err(e)),
                }
            })
            .await;

        match outcome {
            Ok(result) => {
                if result.is_ok() {
                    tracing::info!(%job_name, "Transfer completed");
                }
                result
            }
            Err(Exhausted::Deadline { waited, .. }) => Err(ExporterError::TransferWaitTimeout {
                job_name: job_name.to_string(),
                waited,
            }),
        }
    }
}
