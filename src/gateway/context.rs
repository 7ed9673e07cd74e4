//! Correlation ids attached to every log record of one message

use tracing::field;

/// Ids identifying the work a message belongs to
///
/// Built from the decoded message and turned into the span the handler runs
/// in. It lives for one message and is never shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationContext {
    pub submission_uuid: Option<String>,
    pub export_job_id: Option<String>,
    pub project_uuid: Option<String>,
    pub document_uuid: Option<String>,
    pub index: Option<String>,
}

impl CorrelationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submission(mut self, uuid: impl Into<String>) -> Self {
        self.submission_uuid = Some(uuid.into());
        self
    }

    pub fn export_job(mut self, id: impl Into<String>) -> Self {
        self.export_job_id = Some(id.into());
        self
    }

    pub fn project(mut self, uuid: impl Into<String>) -> Self {
        self.project_uuid = Some(uuid.into());
        self
    }

    pub fn document(mut self, uuid: impl Into<String>) -> Self {
        self.document_uuid = Some(uuid.into());
        self
    }

    /// Position of the message in its batch, rendered `index/total`
    pub fn index(mut self, index: u32, total: u32) -> Self {
        self.index = Some(format!("{index}/{total}"));
        self
    }

    pub fn span(&self, handler: &'static str) -> tracing::Span {
        let span = tracing::info_span!(
            "message",
            handler,
            submission_uuid = field::Empty,
            export_job_id = field::Empty,
            project_uuid = field::Empty,
            document_uuid = field::Empty,
            index = field::Empty,
        );
        let fields = [
            ("submission_uuid", &self.submission_uuid),
            ("export_job_id", &self.export_job_id),
            ("project_uuid", &self.project_uuid),
            ("document_uuid", &self.document_uuid),
            ("index", &self.index),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                span.record(name, value.as_str());
            }
        }
        span
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_ids() {
        let context = CorrelationContext::new()
            .submission("S1")
            .export_job("E1")
            .document("P1")
            .index(3, 5);

        assert_eq!(context.submission_uuid.as_deref(), Some("S1"));
        assert_eq!(context.export_job_id.as_deref(), Some("E1"));
        assert_eq!(context.document_uuid.as_deref(), Some("P1"));
        assert_eq!(context.index.as_deref(), Some("3/5"));
        assert!(context.project_uuid.is_none());
    }
}
