//! Domain identifier types with validation
//!
//! Newtype wrappers for identifiers that cross component boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const TRANSFER_JOB_PREFIX: &str = "transferJobs/";

/// Export job identifier
///
/// Assigned by the upstream system that creates the export job. Every
/// message in the pipeline carries it as `exportJobId`.
///
/// # Examples
///
/// ```
/// use ingest_exporter::domain::ids::ExportJobId;
/// use std::str::FromStr;
///
/// let id = ExportJobId::from_str("63f1b2c4e5a6").unwrap();
/// assert_eq!(id.as_str(), "63f1b2c4e5a6");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExportJobId(String);

impl ExportJobId {
    /// Creates a new ExportJobId
    ///
    /// # Returns
    ///
    /// Returns `Err` if the id is empty or blank
    pub fn new(id: impl Into<String>) -> Result<Self, String> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err("Export job id cannot be empty".to_string());
        }
        Ok(Self(id))
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ExportJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ExportJobId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for ExportJobId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExportJobId> for String {
    fn from(id: ExportJobId) -> Self {
        id.0
    }
}

impl AsRef<str> for ExportJobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Transfer job name
///
/// Always `transferJobs/{export_job_id}`. Deriving it from the export job id
/// makes job creation idempotent across workers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferJobName(String);

impl TransferJobName {
    /// Derives the transfer job name for an export job
    pub fn for_export_job(export_job_id: &ExportJobId) -> Self {
        Self(format!("{TRANSFER_JOB_PREFIX}{export_job_id}"))
    }

    /// Parses a job name received from the transfer service
    ///
    /// # Returns
    ///
    /// Returns `None` if the name lacks the `transferJobs/` prefix or the
    /// remainder is not a valid export job id
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(TRANSFER_JOB_PREFIX)?;
        ExportJobId::new(rest).ok()?;
        Some(Self(name.to_string()))
    }

    /// The export job this transfer belongs to
    pub fn export_job_id(&self) -> ExportJobId {
        let rest = self.0.strip_prefix(TRANSFER_JOB_PREFIX).unwrap_or(&self.0);
        ExportJobId(rest.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransferJobName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
