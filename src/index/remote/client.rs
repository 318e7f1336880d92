//! HTTP transport for a Solr-compatible collection

use crate::error::{IndexError, Result};
use crate::index::config::RemoteConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::Duration;
use tracing::debug;

/// A search through the JSON request API
#[derive(Debug, Clone, Default, Serialize)]
pub struct SelectRequest {
    pub query: String,
    pub offset: usize,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub params: Map<String, Value>,
}

impl SelectRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        let sort = sort.into();
        self.sort = (!sort.is_empty()).then_some(sort);
        self
    }

    pub fn fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.join(","));
        self
    }

    /// Pivot facet over `fields`, every bucket returned
    pub fn pivot(mut self, fields: &[&str]) -> Self {
        self.params.insert("facet".into(), json!("true"));
        self.params.insert("facet.pivot".into(), json!(fields.join(",")));
        self.params.insert("facet.limit".into(), json!("-1"));
        self.params.insert("facet.mincount".into(), json!("1"));
        self
    }
}

#[derive(Debug, Deserialize)]
pub struct SelectResponse {
    pub response: DocList,
    #[serde(default)]
    pub facet_counts: Option<FacetCounts>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocList {
    pub num_found: u64,
    #[serde(default)]
    pub docs: Vec<Map<String, Value>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FacetCounts {
    #[serde(default)]
    pub facet_pivot: Map<String, Value>,
}

/// One level of a pivot facet
#[derive(Debug, Clone, Deserialize)]
pub struct PivotBucket {
    pub field: String,
    pub value: Value,
    pub count: u64,
    #[serde(default)]
    pub pivot: Vec<PivotBucket>,
}

impl SelectResponse {
    /// Top-level buckets of the pivot over `fields`
    pub fn pivot(&self, fields: &[&str]) -> Result<Vec<PivotBucket>> {
        let key = fields.join(",");
        match self
            .facet_counts
            .as_ref()
            .and_then(|counts| counts.facet_pivot.get(&key))
        {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Ok(Vec::new()),
        }
    }
}

/// Solr collection client
#[derive(Clone)]
pub struct SolrClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl SolrClient {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.collection_url(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn ping(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/admin/ping", self.base_url))
            .query(&[("wt", "json")])
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        check_status(response).await.map(|_| ())
    }

    pub async fn select(&self, request: &SelectRequest) -> Result<SelectResponse> {
        debug!(url = %self.base_url, query = %request.query, sort = ?request.sort, "Remote select");
        let response = self
            .client
            .post(format!("{}/select", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        let body = check_status(response).await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Add or replace documents keyed by uuid
    pub async fn add(&self, docs: &[Value]) -> Result<()> {
        self.update(&Value::Array(docs.to_vec())).await
    }

    pub async fn delete_by_id(&self, ids: &[String]) -> Result<()> {
        self.update(&json!({ "delete": ids })).await
    }

    pub async fn delete_by_query(&self, query: &str) -> Result<()> {
        self.update(&json!({ "delete": { "query": query } })).await
    }

    pub async fn commit(&self) -> Result<()> {
        self.update(&json!({ "commit": {} })).await
    }

    async fn update(&self, body: &Value) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/update", self.base_url))
            .query(&[("wt", "json")])
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        check_status(response).await.map(|_| ())
    }

    fn transport_error(&self, err: reqwest::Error) -> IndexError {
        if err.is_timeout() {
            IndexError::SearchTimeout(format!(
                "Remote request timed out after {}ms",
                self.timeout.as_millis()
            ))
        } else {
            IndexError::from(err)
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<String> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if status.is_success() {
        Ok(body)
    } else if status.is_server_error() || status == reqwest::StatusCode::NOT_FOUND {
        Err(IndexError::BackendUnavailable(format!("HTTP {}: {}", status, body)))
    } else {
        Err(IndexError::Engine(format!("HTTP {}: {}", status, body)))
    }
}
