//! Export job model
//!
//! The export job is created upstream before any message reaches the exporter.
//! The exporter only reads it and advances its state.

use crate::domain::errors::ExporterError;
use crate::domain::ids::ExportJobId;
use crate::domain::result::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

/// Overall export job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExportJobState {
    Exporting,
    Exported,
    Deprecated,
    Failed,
}

impl ExportJobState {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "EXPORTING" => Some(Self::Exporting),
            "EXPORTED" => Some(Self::Exported),
            "DEPRECATED" => Some(Self::Deprecated),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exporting => "EXPORTING",
            Self::Exported => "EXPORTED",
            Self::Deprecated => "DEPRECATED",
            Self::Failed => "FAILED",
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Exporting)
    }

    /// Whether moving from `self` to `next` is allowed
    ///
    /// Re-asserting the current state is always allowed.
    pub fn can_transition_to(&self, next: ExportJobState) -> bool {
        *self == next
            || matches!(
                (self, next),
                (Self::Exporting, Self::Exported) | (Self::Exporting, Self::Failed)
            )
    }
}

impl fmt::Display for ExportJobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of one sub-task; ordered so that later states compare greater
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    NotStarted,
    Started,
    Complete,
}

impl TaskState {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "NOT_STARTED" => Some(Self::NotStarted),
            "STARTED" => Some(Self::Started),
            "COMPLETE" => Some(Self::Complete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::Started => "STARTED",
            Self::Complete => "COMPLETE",
        }
    }
}

impl Default for TaskState {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Independently tracked sub-task of an export job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubStateDimension {
    DataFileTransfer,
    SpreadsheetGeneration,
}

impl SubStateDimension {
    /// Field name inside the job's `context`
    pub fn field(&self) -> &'static str {
        match self {
            Self::DataFileTransfer => "dataFileTransfer",
            Self::SpreadsheetGeneration => "spreadsheetGeneration",
        }
    }
}

impl fmt::Display for SubStateDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// Export job as read from the metadata store
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    pub job_id: ExportJobId,
    /// Empty when the submission has been deleted
    pub submission_id: String,
    pub created_date: Option<DateTime<Utc>>,
    pub updated_date: Option<DateTime<Utc>>,
    pub state: ExportJobState,
    pub expected_entity_count: u64,
    pub data_file_transfer: TaskState,
    pub spreadsheet_generation: TaskState,
}

impl ExportJob {
    /// Parses the HAL document returned by the ingest API
    ///
    /// The job id and submission id are the last path segments of
    /// `_links.self.href` and `_links.submission.href`.
    pub fn from_ingest_json(data: &Value) -> Result<Self> {
        let self_href = data
            .pointer("/_links/self/href")
            .and_then(Value::as_str)
            .ok_or_else(|| ExporterError::Parse("export job has no self link".to_string()))?;
        let job_id = ExportJobId::new(last_segment(self_href)).map_err(ExporterError::Parse)?;

        let submission_id = data
            .pointer("/_links/submission/href")
            .and_then(Value::as_str)
            .map(|href| last_segment(href).to_string())
            .unwrap_or_default();

        let status = data
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ExporterError::Parse(format!("export job {job_id} has no status")))?;
        let state = ExportJobState::parse(status).ok_or_else(|| {
            ExporterError::Parse(format!("export job {job_id} has unknown status '{status}'"))
        })?;

        let context = data.get("context").cloned().unwrap_or(Value::Null);
        let sub_state = |field: &str| -> Result<TaskState> {
            match context.get(field).and_then(Value::as_str) {
                None => Ok(TaskState::NotStarted),
                Some(value) => TaskState::parse(value).ok_or_else(|| {
                    ExporterError::Parse(format!("unknown {field} state '{value}'"))
                }),
            }
        };
        let expected_entity_count = match context.get("totalAssayCount") {
            None | Some(Value::Null) => 0,
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::String(s)) => s.parse().map_err(|_| {
                ExporterError::Parse(format!("totalAssayCount '{s}' is not a number"))
            })?,
            Some(other) => {
                return Err(ExporterError::Parse(format!(
                    "totalAssayCount has unexpected value {other}"
                )))
            }
        };

        Ok(Self {
            job_id,
            submission_id,
            created_date: date_at(data, "createdDate"),
            updated_date: date_at(data, "updatedDate"),
            state,
            expected_entity_count,
            data_file_transfer: sub_state(SubStateDimension::DataFileTransfer.field())?,
            spreadsheet_generation: sub_state(SubStateDimension::SpreadsheetGeneration.field())?,
        })
    }

    /// Whether the linked submission has been deleted
    pub fn is_submission_deleted(&self) -> bool {
        self.submission_id.is_empty()
    }

    pub fn sub_state(&self, dimension: SubStateDimension) -> TaskState {
        match dimension {
            SubStateDimension::DataFileTransfer => self.data_file_transfer,
            SubStateDimension::SpreadsheetGeneration => self.spreadsheet_generation,
        }
    }
}

/// A field update applied to an export job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportJobPatch {
    State(ExportJobState),
    SubState(SubStateDimension, TaskState),
}

impl ExportJobPatch {
    /// JSON body sent to the metadata store
    pub fn body(&self) -> Value {
        match self {
            Self::State(state) => json!({ "status": state.as_str() }),
            Self::SubState(dimension, state) => {
                let mut body = serde_json::Map::new();
                body.insert(dimension.field().to_string(), json!(state.as_str()));
                Value::Object(body)
            }
        }
    }
}

fn last_segment(href: &str) -> &str {
    href.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

fn date_at(data: &Value, field: &str) -> Option<DateTime<Utc>> {
    data.get(field)
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}
