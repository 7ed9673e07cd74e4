//! Ingest REST API client
//!
//! Talks to the ingest HAL API. Reads are retried with exponential backoff;
//! writes are retried only when the failure is transient.

use super::{MetadataStore, SchemaKind, SchemaRef};
use crate::config::{IngestConfig, RetryConfig, SecretString};
use crate::domain::metadata::EntityKind;
use crate::domain::{
    ExportJob, ExportJobId, ExportJobPatch, ExportJobState, ExporterError, MetadataError,
    MetadataNode, Relation, Result, Submission,
};
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::time::Duration;

/// [`MetadataStore`] backed by the ingest REST API
///
/// # Example
///
/// ```no_run
/// use ingest_exporter::adapters::metadata::IngestApiClient;
/// use ingest_exporter::config::IngestConfig;
///
/// # fn example() -> ingest_exporter::domain::Result<()> {
/// let config = IngestConfig {
///     base_url: "https://api.ingest.example.org".to_string(),
///     ..Default::default()
/// };
/// let client = IngestApiClient::new(&config)?;
/// assert_eq!(client.base_url(), "https://api.ingest.example.org");
/// # Ok(())
/// # }
/// ```
pub struct IngestApiClient {
    base_url: String,
    client: Client,
    api_token: Option<SecretString>,
    retry: RetryConfig,
    page_size: String,
}

impl IngestApiClient {
    /// Creates a client from the ingest configuration
    ///
    /// # Errors
    ///
    /// Returns `ExporterError::Configuration` if the HTTP client cannot be built
    pub fn new(config: &IngestConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ExporterError::Configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
            api_token: config.api_token.clone(),
            retry: config.retry.clone(),
            page_size: config.page_size.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, url)
            .header("Accept", "application/hal+json");
        match &self.api_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Retry a request with exponential backoff while the error is transient
    async fn retry_request<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_retries = self.retry.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries || !e.is_retryable() {
                        return Err(e);
                    }

                    let factor = self.retry.backoff_multiplier.powf((attempt - 1) as f64);
                    let delay_ms = ((self.retry.initial_delay_ms as f64) * factor) as u64;
                    let delay_ms = delay_ms.min(self.retry.max_delay_ms);

                    tracing::warn!(
                        attempt = attempt,
                        max_retries = max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Retrying request after error"
                    );

                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
        not_found: (&str, &str),
    ) -> Result<Value> {
        self.retry_request(|| async {
            let mut request = self.request(method.clone(), url).query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| MetadataError::Unavailable(format!("{method} {url}: {e}")))?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                return Err(MetadataError::not_found(not_found.0, not_found.1).into());
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                let status = status.as_u16();
                return Err(if status >= 500 {
                    MetadataError::ServerError { status, message }
                } else {
                    MetadataError::ClientError { status, message }
                }
                .into());
            }

            let text = response
                .text()
                .await
                .map_err(|e| MetadataError::InvalidResponse(e.to_string()))?;
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            serde_json::from_str(&text)
                .map_err(|e| MetadataError::InvalidResponse(format!("{url}: {e}")).into())
        })
        .await
    }

    async fn get_json(&self, url: &str, query: &[(&str, &str)], kind: &str, id: &str) -> Result<Value> {
        self.send(Method::GET, url, query, None, (kind, id)).await
    }

    async fn get_optional(&self, url: &str, query: &[(&str, &str)], kind: &str, id: &str) -> Result<Option<Value>> {
        match self.get_json(url, query, kind, id).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn count_entities(&self, id: &ExportJobId, query: &[(&str, &str)]) -> Result<u64> {
        let url = self.url(&format!("exportJobs/{id}/entities"));
        let page = self.get_json(&url, query, "exportJob", id.as_str()).await?;
        page.pointer("/page/totalElements")
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                MetadataError::InvalidResponse(format!("entities of {id} have no page total")).into()
            })
    }
}

#[async_trait]
impl MetadataStore for IngestApiClient {
    async fn get_entity(&self, kind: EntityKind, uuid: &str) -> Result<MetadataNode> {
        let url = self.url(&format!("{}/search/findByUuid", kind.collection()));
        let document = self
            .get_json(&url, &[("uuid", uuid)], &kind.to_string(), uuid)
            .await?;
        MetadataNode::from_ingest_json(&document)
    }

    async fn get_related_entities(
        &self,
        relation: Relation,
        of: &MetadataNode,
    ) -> Result<Vec<MetadataNode>> {
        let Some(href) = of.links.get(relation.as_str()) else {
            tracing::debug!(uuid = %of.uuid, relation = %relation, "Document has no such relation");
            return Ok(Vec::new());
        };

        let collection = relation.target().collection();
        let mut related = Vec::new();
        let mut next = Some(href.clone());
        // next links carry their own paging query
        let mut query = vec![("size", self.page_size.as_str())];

        while let Some(url) = next.take() {
            let page = self
                .get_json(&url, &query, relation.as_str(), &of.uuid)
                .await?;
            query.clear();
            if let Some(items) = page
                .pointer(&format!("/_embedded/{collection}"))
                .and_then(Value::as_array)
            {
                for item in items {
                    related.push(MetadataNode::from_ingest_json(item)?);
                }
            }
            next = page
                .pointer("/_links/next/href")
                .and_then(Value::as_str)
                .map(str::to_string);
        }

        Ok(related)
    }

    async fn get_submission(&self, uuid: &str) -> Result<Option<Submission>> {
        let url = self.url("submissionEnvelopes/search/findByUuid");
        self.get_optional(&url, &[("uuid", uuid)], "submission", uuid)
            .await?
            .map(|document| Submission::from_ingest_json(&document))
            .transpose()
    }

    async fn get_export_job(&self, id: &ExportJobId) -> Result<Option<ExportJob>> {
        let url = self.url(&format!("exportJobs/{id}"));
        self.get_optional(&url, &[], "exportJob", id.as_str())
            .await?
            .map(|document| ExportJob::from_ingest_json(&document))
            .transpose()
    }

    async fn patch_export_job(&self, id: &ExportJobId, patch: ExportJobPatch) -> Result<()> {
        let url = match patch {
            ExportJobPatch::State(_) => self.url(&format!("exportJobs/{id}")),
            ExportJobPatch::SubState(..) => self.url(&format!("exportJobs/{id}/context")),
        };
        let body = patch.body();
        self.send(Method::PATCH, &url, &[], Some(&body), ("exportJob", id.as_str()))
            .await?;
        Ok(())
    }

    async fn get_latest_schema(&self, kind: SchemaKind) -> Result<SchemaRef> {
        let url = self.url("schemas/search/filtered");
        let query = [
            ("highLevelEntity", kind.high_level_entity()),
            ("concreteEntity", kind.concrete_entity()),
            ("latest", "true"),
        ];
        let page = self
            .get_json(&url, &query, "schema", kind.concrete_entity())
            .await?;

        let schema = page
            .pointer("/_embedded/schemas/0")
            .ok_or_else(|| MetadataError::not_found("schema", kind.concrete_entity()))?;
        let url = schema
            .pointer("/_links/json-schema/href")
            .and_then(Value::as_str);
        let version = schema.get("schemaVersion").and_then(Value::as_str);
        match (url, version) {
            (Some(url), Some(version)) => Ok(SchemaRef {
                url: url.to_string(),
                version: version.to_string(),
            }),
            _ => Err(MetadataError::InvalidResponse(format!(
                "latest {kind} schema has no url or version"
            ))
            .into()),
        }
    }

    async fn create_export_entity(&self, id: &ExportJobId, entity_id: &str) -> Result<()> {
        let url = self.url(&format!("exportJobs/{id}/entities"));
        let body = json!({
            "status": ExportJobState::Exported.as_str(),
            "context": {"assayProcessId": entity_id},
            "errors": []
        });
        self.send(Method::POST, &url, &[], Some(&body), ("exportJob", id.as_str()))
            .await?;
        Ok(())
    }

    async fn count_completed_entities(&self, id: &ExportJobId) -> Result<u64> {
        self.count_entities(id, &[("status", ExportJobState::Exported.as_str())])
            .await
    }

    async fn export_entity_exists(&self, id: &ExportJobId, entity_id: &str) -> Result<bool> {
        let query = [
            ("status", ExportJobState::Exported.as_str()),
            ("assayProcessId", entity_id),
        ];
        Ok(self.count_entities(id, &query).await? > 0)
    }

    async fn create_bundle_manifest(&self, manifest: &Value) -> Result<()> {
        let url = self.url("bundleManifests");
        self.send(Method::POST, &url, &[], Some(manifest), ("bundleManifest", ""))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metadata::fixtures;
    use crate::domain::{SubStateDimension, TaskState};
    use mockito::Matcher;

    fn client_for(server: &mockito::ServerGuard) -> IngestApiClient {
        let config = IngestConfig {
            base_url: server.url(),
            retry: RetryConfig {
                max_retries: 2,
                initial_delay_ms: 1,
                max_delay_ms: 5,
                backoff_multiplier: 2.0,
            },
            ..Default::default()
        };
        IngestApiClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_get_entity_by_uuid() {
        let mut server = mockito::Server::new_async().await;
        let body = fixtures::document("Process", "p1", "process", "9.2.0");
        let mock = server
            .mock("GET", "/processes/search/findByUuid")
            .match_query(Matcher::UrlEncoded("uuid".into(), "p1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let node = client.get_entity(EntityKind::Process, "p1").await.unwrap();

        assert_eq!(node.uuid, "p1");
        assert_eq!(node.kind, EntityKind::Process);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_related_entities_follow_pages() {
        let mut server = mockito::Server::new_async().await;
        let mut process = fixtures::document("Process", "p1", "process", "9.2.0");
        process["_links"]["inputBiomaterials"] =
            json!({"href": format!("{}/processes/p1/inputBiomaterials", server.url())});
        let process = MetadataNode::from_ingest_json(&process).unwrap();

        let first = json!({
            "_embedded": {"biomaterials": [fixtures::document("Biomaterial", "b1", "donor_organism", "15.5.0")]},
            "_links": {"next": {"href": format!("{}/processes/p1/inputBiomaterials?page=1", server.url())}}
        });
        let second = json!({
            "_embedded": {"biomaterials": [fixtures::document("Biomaterial", "b2", "specimen_from_organism", "10.3.0")]},
            "_links": {}
        });
        server
            .mock("GET", "/processes/p1/inputBiomaterials")
            .match_query(Matcher::UrlEncoded("size".into(), "100".into()))
            .with_status(200)
            .with_body(first.to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/processes/p1/inputBiomaterials")
            .match_query(Matcher::UrlEncoded("page".into(), "1".into()))
            .with_status(200)
            .with_body(second.to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let related = client
            .get_related_entities(Relation::InputBiomaterials, &process)
            .await
            .unwrap();

        let uuids: Vec<_> = related.iter().map(|n| n.uuid.as_str()).collect();
        assert_eq!(uuids, vec!["b1", "b2"]);
    }

    #[tokio::test]
    async fn test_missing_relation_link_is_empty() {
        let server = mockito::Server::new_async().await;
        let process = MetadataNode::from_ingest_json(&fixtures::document(
            "Process", "p1", "process", "9.2.0",
        ))
        .unwrap();

        let client = client_for(&server);
        let related = client
            .get_related_entities(Relation::Protocols, &process)
            .await
            .unwrap();
        assert!(related.is_empty());
    }

    #[tokio::test]
    async fn test_missing_export_job_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/exportJobs/E404")
            .with_status(404)
            .create_async()
            .await;

        let client = client_for(&server);
        let id = ExportJobId::new("E404").unwrap();
        assert!(client.get_export_job(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/exportJobs/E1")
            .with_status(503)
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&server);
        let id = ExportJobId::new("E1").unwrap();
        let err = client.get_export_job(&id).await.unwrap_err();

        assert!(matches!(
            err,
            ExporterError::Metadata(MetadataError::ServerError { status: 503, .. })
        ));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_sub_state_patch_targets_context() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PATCH", "/exportJobs/E1/context")
            .match_body(Matcher::Json(json!({"dataFileTransfer": "COMPLETE"})))
            .with_status(200)
            .create_async()
            .await;

        let client = client_for(&server);
        let id = ExportJobId::new("E1").unwrap();
        client
            .patch_export_job(
                &id,
                ExportJobPatch::SubState(SubStateDimension::DataFileTransfer, TaskState::Complete),
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_count_completed_entities() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/exportJobs/E1/entities")
            .match_query(Matcher::UrlEncoded("status".into(), "EXPORTED".into()))
            .with_status(200)
            .with_body(json!({"page": {"totalElements": 7}}).to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let id = ExportJobId::new("E1").unwrap();
        assert_eq!(client.count_completed_entities(&id).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_latest_schema() {
        let mut server = mockito::Server::new_async().await;
        let body = json!({
            "_embedded": {"schemas": [{
                "schemaVersion": "3.0.0",
                "_links": {"json-schema": {"href": "https://schema.example.org/system/3.0.0/links"}}
            }]}
        });
        server
            .mock("GET", "/schemas/search/filtered")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("concreteEntity".into(), "links".into()),
                Matcher::UrlEncoded("latest".into(), "true".into()),
            ]))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await;

        let client = client_for(&server);
        let schema = client.get_latest_schema(SchemaKind::Links).await.unwrap();
        assert_eq!(schema.version, "3.0.0");
        assert!(schema.url.ends_with("/links"));
    }
}
