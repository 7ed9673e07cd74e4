//! Domain error types
//!
//! This module defines the error hierarchy for the exporter.
//! Collaborator failures are mapped into domain-specific variants so that
//! no third-party client types leak out of the adapters.

use std::time::Duration;
use thiserror::Error;

/// Main exporter error type
///
/// Every fallible operation in the library returns this error. The message
/// gateway turns any error that reaches it into a reject-without-requeue.
#[derive(Debug, Error)]
pub enum ExporterError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Malformed message body or metadata document
    #[error("Parse error: {0}")]
    Parse(String),

    /// Metadata store (ingest API) errors
    #[error("Metadata store error: {0}")]
    Metadata(#[from] MetadataError),

    /// Object store errors
    #[error("Object store error: {0}")]
    Storage(#[from] StorageError),

    /// A conflicting upload never reported completion within the deadline
    #[error("Upload verification timed out for {key} after {waited:?}")]
    UploadVerificationTimeout { key: String, waited: Duration },

    /// The transfer service refused to create the job for a reason other than a conflict
    #[error("Transfer could not start: {0}")]
    TransferCouldNotStart(String),

    /// A transfer job did not complete within the wait deadline
    #[error("Transfer {job_name} did not complete within {waited:?}")]
    TransferWaitTimeout { job_name: String, waited: Duration },

    /// Transfer service errors other than job creation
    #[error("Transfer service error: {0}")]
    Transfer(String),

    /// A generated document failed schema validation
    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    /// The submission does not request the action this export requires
    #[error("Submission {submission_uuid} does not have the required action '{action}'")]
    MissingSubmitAction {
        submission_uuid: String,
        action: String,
    },

    /// Message broker errors
    #[error("Broker error: {0}")]
    Broker(String),

    /// Notification channel errors
    #[error("Notification channel error: {0}")]
    Notification(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

impl ExporterError {
    /// Whether the failure is transient and the same call may succeed if retried
    pub fn is_retryable(&self) -> bool {
        match self {
            ExporterError::Storage(err) => err.is_retryable(),
            ExporterError::Metadata(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Whether the failure means the referenced resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ExporterError::Metadata(MetadataError::NotFound { .. })
                | ExporterError::Storage(StorageError::NotFound(_))
        )
    }
}

/// Metadata store errors
///
/// Errors raised while talking to the ingest REST API or an equivalent store.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Requested resource does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    /// Store temporarily unavailable
    #[error("Metadata store unavailable: {0}")]
    Unavailable(String),

    /// Response could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Server error (5xx)
    #[error("Server error: {status} - {message}")]
    ServerError { status: u16, message: String },

    /// Client error (4xx)
    #[error("Client error: {status} - {message}")]
    ClientError { status: u16, message: String },
}

impl MetadataError {
    pub fn not_found(kind: impl Into<String>, id: impl Into<String>) -> Self {
        MetadataError::NotFound {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MetadataError::Unavailable(_) | MetadataError::ServerError { .. }
        )
    }
}

/// Object store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object does not exist
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Store temporarily unavailable (503 and friends)
    #[error("Object store unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure
    #[error("Object store backend failure: {0}")]
    Backend(String),
}

impl StorageError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Unavailable(_))
    }
}

impl From<std::io::Error> for ExporterError {
    fn from(err: std::io::Error) -> Self {
        ExporterError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ExporterError {
    fn from(err: serde_json::Error) -> Self {
        ExporterError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ExporterError {
    fn from(err: toml::de::Error) -> Self {
        ExporterError::Configuration(format!("TOML parse error: {err}"))
    }
}
