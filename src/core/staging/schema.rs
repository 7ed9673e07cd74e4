//! Schema stamping and validation for generated documents
//!
//! Links and file-descriptor documents are produced by the exporter, not the
//! metadata store, so they are stamped with the latest published schema
//! before being staged. Lookups are cached for a configurable TTL.

use crate::adapters::metadata::{MetadataStore, SchemaKind, SchemaRef};
use crate::domain::{ExporterError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Validates a stamped document against its schema
pub trait DocumentValidator: Send + Sync {
    /// # Errors
    ///
    /// Returns `ExporterError::SchemaValidation` describing the first violation
    fn validate(&self, kind: SchemaKind, document: &Value) -> Result<()>;
}

/// Checks that the fields each generated document type must carry are present
#[derive(Debug, Default, Clone, Copy)]
pub struct RequiredFieldsValidator;

impl RequiredFieldsValidator {
    fn required(kind: SchemaKind) -> &'static [&'static str] {
        match kind {
            SchemaKind::Links => &["describedBy", "schema_version", "schema_type", "links"],
            SchemaKind::FileDescriptor => &[
                "describedBy",
                "schema_version",
                "schema_type",
                "file_id",
                "file_version",
                "file_name",
                "content_type",
                "size",
            ],
            SchemaKind::SupplementaryFile => &["describedBy", "schema_type", "file_core"],
        }
    }
}

impl DocumentValidator for RequiredFieldsValidator {
    fn validate(&self, kind: SchemaKind, document: &Value) -> Result<()> {
        let object = document.as_object().ok_or_else(|| {
            ExporterError::SchemaValidation(format!("{kind} document is not an object"))
        })?;

        for field in Self::required(kind) {
            match object.get(*field) {
                None | Some(Value::Null) => {
                    return Err(ExporterError::SchemaValidation(format!(
                        "{kind} document is missing required field '{field}'"
                    )))
                }
                Some(_) => {}
            }
        }

        let schema_type = match kind {
            SchemaKind::SupplementaryFile => "file",
            other => other.concrete_entity(),
        };
        if object.get("schema_type").and_then(Value::as_str) != Some(schema_type) {
            return Err(ExporterError::SchemaValidation(format!(
                "{kind} document has schema_type {:?}",
                object.get("schema_type")
            )));
        }
        Ok(())
    }
}

/// Latest-schema lookup with a TTL cache
pub struct SchemaService {
    store: Arc<dyn MetadataStore>,
    validator: Arc<dyn DocumentValidator>,
    ttl: Duration,
    cache: Mutex<HashMap<SchemaKind, (SchemaRef, Instant)>>,
}

impl SchemaService {
    pub fn new(
        store: Arc<dyn MetadataStore>,
        validator: Arc<dyn DocumentValidator>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            validator,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Latest published schema of `kind`
    pub async fn latest(&self, kind: SchemaKind) -> Result<SchemaRef> {
        if let Some(schema) = self.cached(kind) {
            return Ok(schema);
        }

        let schema = self.store.get_latest_schema(kind).await?;
        tracing::debug!(schema = %kind, version = %schema.version, "Fetched latest schema");
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(kind, (schema.clone(), Instant::now()));
        }
        Ok(schema)
    }

    /// Stamps `describedBy` and `schema_version` onto `document` and validates it
    ///
    /// # Errors
    ///
    /// Returns `ExporterError::SchemaValidation` if the stamped document is invalid
    pub async fn stamp_and_validate(&self, kind: SchemaKind, document: &mut Value) -> Result<()> {
        let schema = self.latest(kind).await?;
        let object = document.as_object_mut().ok_or_else(|| {
            ExporterError::SchemaValidation(format!("{kind} document is not an object"))
        })?;
        object.insert("describedBy".to_string(), Value::String(schema.url));
        object.insert("schema_version".to_string(), Value::String(schema.version));
        self.validator.validate(kind, document)
    }

    pub fn validate(&self, kind: SchemaKind, document: &Value) -> Result<()> {
        self.validator.validate(kind, document)
    }

    fn cached(&self, kind: SchemaKind) -> Option<SchemaRef> {
        let cache = self.cache.lock().ok()?;
        let (schema, fetched_at) = cache.get(&kind)?;
        (fetched_at.elapsed() < self.ttl).then(|| schema.clone())
    }
}
