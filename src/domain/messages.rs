//! Broker message schemas
//!
//! All messages are JSON objects with camelCase field names.

use crate::domain::errors::ExporterError;
use crate::domain::ids::ExportJobId;
use crate::domain::result::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request to export one experiment (assay process) to the staging area
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentMessage {
    /// Metadata store id of the assay process
    pub document_id: String,
    /// UUID of the assay process
    pub document_uuid: String,
    /// UUID of the submission envelope
    pub envelope_uuid: String,
    pub index: u32,
    pub total: u32,
    pub export_job_id: ExportJobId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_uuid: Option<String>,
}

/// Request to transfer the data files of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionExportMessage {
    pub export_job_id: ExportJobId,
    pub submission_uuid: String,
    pub project_uuid: String,
    #[serde(default)]
    pub callback_link: Option<String>,
    #[serde(default)]
    pub context: Option<Value>,
}

/// Request to build the assay manifest of one process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestMessage {
    pub document_uuid: String,
    pub envelope_uuid: String,
    #[serde(default)]
    pub callback_link: Option<String>,
    pub index: u32,
    pub total: u32,
}

/// Request to generate and stage the project spreadsheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetMessage {
    pub export_job_id: ExportJobId,
    pub submission_uuid: String,
    pub project_uuid: String,
}

/// Decodes a message body
///
/// # Errors
///
/// Any malformed body, including blank ids, is an `ExporterError::Parse`
pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| ExporterError::Parse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_experiment_message() {
        let body = json!({
            "documentId": "D1",
            "documentUuid": "P1",
            "envelopeUuid": "S1",
            "index": 3,
            "total": 5,
            "exportJobId": "E1"
        });
        let msg: ExperimentMessage = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(msg.document_id, "D1");
        assert_eq!(msg.document_uuid, "P1");
        assert_eq!(msg.index, 3);
        assert_eq!(msg.export_job_id.as_str(), "E1");
        assert!(msg.project_uuid.is_none());
    }

    #[test]
    fn test_missing_document_uuid_is_parse_error() {
        let body = json!({
            "documentId": "D1",
            "envelopeUuid": "S1",
            "index": 3,
            "total": 5,
            "exportJobId": "E1"
        });
        let err = decode::<ExperimentMessage>(body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ExporterError::Parse(_)));
        assert!(err.to_string().contains("documentUuid"));
    }

    #[test]
    fn test_blank_export_job_id_is_parse_error() {
        let body = json!({
            "exportJobId": "",
            "submissionUuid": "S1",
            "projectUuid": "PR1"
        });
        let err = decode::<SubmissionExportMessage>(body.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ExporterError::Parse(_)));
    }

    #[test]
    fn test_submission_message_optional_fields() {
        let body = json!({
            "exportJobId": "E1",
            "submissionUuid": "S1",
            "projectUuid": "PR1",
            "callbackLink": "/submissionEnvelopes/S1",
            "context": {"totalAssayCount": 5}
        });
        let msg: SubmissionExportMessage = decode(body.to_string().as_bytes()).unwrap();
        assert_eq!(msg.callback_link.as_deref(), Some("/submissionEnvelopes/S1"));
        assert_eq!(msg.context.unwrap()["totalAssayCount"], 5);
    }

    #[test]
    fn test_not_json_is_parse_error() {
        let err = decode::<ManifestMessage>(b"not json").unwrap_err();
        assert!(matches!(err, ExporterError::Parse(_)));
    }
}
