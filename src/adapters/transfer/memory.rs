//! In-memory transfer service

use super::{OperationFilter, TransferCreation, TransferJobSpec, TransferOperation, TransferService};
use crate::domain::{ExporterError, Result, TransferJobName};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug)]
struct Job {
    spec: TransferJobSpec,
    done: bool,
}

/// [`TransferService`] that keeps jobs in a map
///
/// Jobs stay running until [`MemoryTransferService::complete`] is called,
/// or complete after a fixed number of polls when configured with
/// [`MemoryTransferService::complete_after_polls`].
#[derive(Debug, Default)]
pub struct MemoryTransferService {
    jobs: Mutex<HashMap<TransferJobName, Job>>,
    create_calls: AtomicUsize,
    list_calls: AtomicUsize,
    complete_after: Mutex<Option<usize>>,
    refuse_with: Mutex<Option<String>>,
}

impl MemoryTransferService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the job's operation as done
    pub fn complete(&self, name: &TransferJobName) {
        if let Ok(mut jobs) = self.jobs.lock() {
            if let Some(job) = jobs.get_mut(name) {
                job.done = true;
            }
        }
    }

    /// Reports every job done once `polls` listings have been served
    pub fn complete_after_polls(&self, polls: usize) {
        if let Ok(mut guard) = self.complete_after.lock() {
            *guard = Some(polls);
        }
    }

    /// Makes every create call fail with `reason`
    pub fn refuse_creation(&self, reason: &str) {
        if let Ok(mut guard) = self.refuse_with.lock() {
            *guard = Some(reason.to_string());
        }
    }

    /// Registers a job as if another worker had created it
    pub fn insert_existing(&self, spec: TransferJobSpec) {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(spec.name.clone(), Job { spec, done: false });
        }
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Spec the job was created with
    pub fn spec(&self, name: &TransferJobName) -> Option<TransferJobSpec> {
        self.jobs
            .lock()
            .ok()
            .and_then(|jobs| jobs.get(name).map(|job| job.spec.clone()))
    }
}

#[async_trait]
impl TransferService for MemoryTransferService {
    async fn create_job(&self, spec: &TransferJobSpec) -> Result<TransferCreation> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);

        let refused = self.refuse_with.lock().ok().and_then(|guard| guard.clone());
        if let Some(reason) = refused {
            return Err(ExporterError::TransferCouldNotStart(reason));
        }

        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| ExporterError::Transfer("job map lock poisoned".to_string()))?;
        if jobs.contains_key(&spec.name) {
            return Ok(TransferCreation::AlreadyExists);
        }
        jobs.insert(
            spec.name.clone(),
            Job {
                spec: spec.clone(),
                done: false,
            },
        );
        Ok(TransferCreation::Created)
    }

    async fn list_operations(&self, filter: &OperationFilter) -> Result<Vec<TransferOperation>> {
        let served = self.list_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let auto_done = self
            .complete_after
            .lock()
            .ok()
            .and_then(|guard| *guard)
            .is_some_and(|polls| served >= polls);

        let jobs = self
            .jobs
            .lock()
            .map_err(|_| ExporterError::Transfer("job map lock poisoned".to_string()))?;
        Ok(jobs
            .get(&filter.job_name)
            .filter(|job| job.spec.project_id == filter.project_id)
            .map(|job| {
                vec![TransferOperation {
                    name: format!("transferOperations/{}", job.spec.name),
                    done: job.done || auto_done,
                }]
            })
            .unwrap_or_default())
    }
}
