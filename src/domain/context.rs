//! Error context extension trait
//!
//! A context extension trait similar to `anyhow::Context` that keeps the
//! library on `Result<T, ExporterError>`.
//!
//! # Examples
//!
//! ```rust
//! use ingest_exporter::domain::Result;
//! use ingest_exporter::domain::context::ResultExt;
//!
//! fn read_body(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .with_context(|| format!("Failed to read message body from {}", path))
//! }
//! ```

use crate::domain::errors::ExporterError;
use crate::domain::result::Result;

/// Extension trait for adding context to `Result` types
pub trait ResultExt<T> {
    /// Add context to an error, evaluated eagerly
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error, evaluated only when the result is an error
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<ExporterError>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| wrap(e.into(), context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| wrap(e.into(), f()))
    }
}

/// Prefix the message while keeping the variants the gateway and retry
/// loops inspect.
fn wrap<C: std::fmt::Display>(base: ExporterError, context: C) -> ExporterError {
    match base {
        ExporterError::Parse(msg) => ExporterError::Parse(format!("{context}: {msg}")),
        ExporterError::SchemaValidation(msg) => {
            ExporterError::SchemaValidation(format!("{context}: {msg}"))
        }
        err @ (ExporterError::Storage(_)
        | ExporterError::Metadata(_)
        | ExporterError::UploadVerificationTimeout { .. }
        | ExporterError::TransferWaitTimeout { .. }) => err,
        other => ExporterError::Other(format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::StorageError;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_context_wraps_message() {
        let result: Result<()> = Err(ExporterError::Broker("channel closed".to_string()));
        let err = result.context("Failed to publish continuation").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Failed to publish continuation"));
        assert!(msg.contains("channel closed"));
    }

    #[test]
    fn test_with_context_is_lazy() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();

        let result: Result<i32> = Ok(42);
        let with_context = result.with_context(|| {
            flag.store(true, Ordering::SeqCst);
            "never built"
        });

        assert!(with_context.is_ok());
        assert!(!called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_parse_errors_stay_parse_errors() {
        let result: Result<()> = Err(ExporterError::Parse("missing field".to_string()));
        let err = result.context("Decoding experiment message").unwrap_err();
        assert!(matches!(err, ExporterError::Parse(_)));
        assert!(err.to_string().contains("Decoding experiment message"));
    }

    #[test]
    fn test_storage_errors_keep_retry_classification() {
        let result: Result<()> = Err(StorageError::Unavailable("503".to_string()).into());
        let err = result.context("Patching completion flag").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_error_with_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let result: std::result::Result<(), std::io::Error> = Err(io_error);
        let err = result.context("Failed to read exporter.toml").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Failed to read exporter.toml"));
        assert!(msg.contains("File not found"));
    }
}
