//! Remote backend over a Solr-compatible HTTP JSON API.
//!
//! The collection is initialized in the background: until the first
//! successful ping, writes are dropped with a warning and reads fail with
//! `BackendUnavailable`.

pub mod clauses;
pub mod client;
pub mod mapper;

pub use clauses::{remote_detail_field, RemoteClauses};
pub use client::{SelectRequest, SelectResponse, SolrClient};

use crate::error::{IndexError, Result};
use crate::index::backend::{EventIndexBackend, FieldSelector};
use crate::index::config::RemoteConfig;
use crate::index::constants::*;
use crate::index::document::DocumentShape;
use crate::index::materializer::PageWindow;
use crate::index::metrics::INDEX_METRICS;
use crate::index::query::{ClauseFactory, QueryCompiler};
use crate::index::saved_search::{saved_search_timeout, SavedSearchHold, SavedSearchRegistry};
use crate::index::sort::map_sorts;
use crate::index::tag_severity::TagSeverityAccumulator;
use crate::models::{
    to_millis, EventFilter, EventKey, EventQuery, EventSeverity, EventSort, EventStatus,
    EventSummary, EventSummaryRequest, IndexedDetails, Page, TagSeverityMap,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use client::PivotBucket;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Pivot used for unfiltered tag severities
const TAG_PIVOT: [&str; 4] = [FIELD_ELEMENT_UUID, FIELD_SEVERITY, FIELD_STATUS, FIELD_COUNT];

const TAG_FIELDS: [&str; 5] = [FIELD_ELEMENT_UUID, FIELD_TAGS, FIELD_SEVERITY, FIELD_STATUS, FIELD_COUNT];

/// Query and sort text of a saved search
struct SavedQuery {
    query: String,
    sort: String,
}

/// Event index backed by a remote collection
pub struct RemoteBackend {
    name: String,
    shape: DocumentShape,
    config: RemoteConfig,
    details: IndexedDetails,
    client: SolrClient,
    clauses: RemoteClauses,
    ready: Arc<AtomicBool>,
    saved: SavedSearchRegistry<SavedQuery>,
    init_task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteBackend {
    /// Create the backend and start pinging the collection until it answers
    pub fn start(
        name: impl Into<String>,
        shape: DocumentShape,
        config: RemoteConfig,
        details: &IndexedDetails,
        max_clause_count: usize,
    ) -> Result<Self> {
        let name = name.into();
        let client = SolrClient::new(&config)?;
        let backend = Self {
            saved: SavedSearchRegistry::new(name.clone())?,
            name,
            shape,
            details: details.clone(),
            client,
            clauses: RemoteClauses::new(max_clause_count),
            ready: Arc::new(AtomicBool::new(false)),
            init_task: Mutex::new(None),
            config,
        };
        backend.spawn_initializer();
        info!(
            backend = %backend.name,
            shape = backend.shape.label(),
            url = %backend.client.base_url(),
            index_version = INDEX_VERSION,
            "Remote event index starting"
        );
        Ok(backend)
    }

    fn spawn_initializer(&self) {
        let client = self.client.clone();
        let ready = Arc::clone(&self.ready);
        let name = self.name.clone();
        let retry = Duration::from_millis(self.config.init_retry_ms.max(1));

        let handle = tokio::spawn(async move {
            loop {
                match client.ping().await {
                    Ok(()) => {
                        ready.store(true, Ordering::SeqCst);
                        info!(backend = %name, "Remote event index ready");
                        break;
                    }
                    Err(e) => {
                        info!(backend = %name, error = %e, "Could not initialize remote index, retrying");
                        tokio::time::sleep(retry).await;
                    }
                }
            }
        });
        if let Some(previous) = self.init_task.lock().replace(handle) {
            previous.abort();
        }
    }

    /// Wait until initialization succeeds; `false` on timeout
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_ready() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    pub fn saved_search_count(&self) -> usize {
        self.saved.len()
    }

    /// Writes are dropped until the collection is reachable
    fn accept_write(&self, operation: &str) -> bool {
        let ready = self.is_ready();
        if !ready {
            warn!(backend = %self.name, operation, "Remote index not ready, dropping write");
        }
        ready
    }

    fn require_ready(&self) -> Result<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(IndexError::BackendUnavailable(format!(
                "{} failed to initialize",
                self.name
            )))
        }
    }

    fn require_records(&self) -> Result<()> {
        if self.shape.stores_record() {
            Ok(())
        } else {
            Err(IndexError::Internal(format!(
                "{} index stores keys only",
                self.name
            )))
        }
    }

    fn compile(&self, filter: Option<&EventFilter>, exclusion: Option<&EventFilter>) -> Result<String> {
        let query = QueryCompiler::new(&self.clauses, &self.details).compile(filter, exclusion)?;
        debug!(backend = %self.name, query = %query, "Compiled query");
        Ok(query)
    }

    fn sort(&self, sort: &[EventSort]) -> Result<String> {
        let keys = map_sorts(sort, &self.details, remote_detail_field)?;
        Ok(keys
            .iter()
            .map(|key| format!("{} {}", key.field, if key.descending { "desc" } else { "asc" }))
            .collect::<Vec<_>>()
            .join(", "))
    }

    fn fields(selector: FieldSelector) -> &'static [&'static str] {
        match selector {
            FieldSelector::Full => &[FIELD_UUID, FIELD_LAST_SEEN_TIME, FIELD_RECORD],
            FieldSelector::Keys => &[FIELD_UUID, FIELD_LAST_SEEN_TIME],
        }
    }

    async fn select(&self, request: &SelectRequest) -> Result<SelectResponse> {
        let started = Instant::now();
        let result = self.client.select(request).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(IndexError::SearchTimeout(_)) => "timeout",
            Err(_) => "error",
        };
        INDEX_METRICS.record_search(&self.name, outcome, started.elapsed().as_secs_f64());
        result
    }

    async fn run(
        &self,
        query: String,
        sort: String,
        offset: i64,
        limit: i64,
        selector: FieldSelector,
    ) -> Result<Page<Map<String, Value>>> {
        self.require_ready()?;
        let window = PageWindow::new(offset, limit, self.config.max_rows)?;
        let request = SelectRequest::new(query)
            .page(window.offset, window.limit)
            .sort(sort)
            .fields(Self::fields(selector));
        let response = self.select(&request).await?;
        let total = response.response.num_found;
        debug!(backend = %self.name, total, "Remote search finished");
        Ok(Page {
            total,
            limit: window.limit,
            next_offset: window.next_offset(total),
            events: response.response.docs,
        })
    }

    async fn find_doc(&self, uuid: &Uuid, selector: FieldSelector) -> Result<Option<Map<String, Value>>> {
        let query = clauses::escape(&uuid.to_string());
        let page = self
            .run(
                format!("{}:{}", FIELD_UUID, query),
                String::new(),
                0,
                1,
                selector,
            )
            .await?;
        Ok(page.events.into_iter().next())
    }

    fn pivot_severities(
        &self,
        buckets: &[PivotBucket],
        accumulator: &mut TagSeverityAccumulator,
    ) {
        for element in buckets {
            let Some(uuid) = element.value.as_str() else {
                continue;
            };
            for severity in &element.pivot {
                let Some(severity_value) =
                    mapper::int_value(&severity.value).and_then(EventSeverity::from_ordinal)
                else {
                    warn!(backend = %self.name, value = %severity.value, "Unknown severity in pivot");
                    continue;
                };
                for status in &severity.pivot {
                    let acknowledged = mapper::int_value(&status.value)
                        .and_then(EventStatus::from_ordinal)
                        == Some(EventStatus::Acknowledged);
                    for count in &status.pivot {
                        let each = mapper::int_value(&count.value).unwrap_or(1).max(0) as u64;
                        accumulator.update_bucket(
                            uuid,
                            severity_value,
                            count.count,
                            count.count * each,
                            acknowledged,
                        );
                    }
                }
            }
        }
    }

    /// Page through every matching document
    async fn accumulate_documents(
        &self,
        query: String,
        accumulator: &mut TagSeverityAccumulator,
    ) -> Result<()> {
        let mut offset = 0usize;
        loop {
            let request = SelectRequest::new(query.clone())
                .page(offset, self.config.max_rows)
                .sort(format!("{} asc", FIELD_UUID))
                .fields(&TAG_FIELDS);
            let response = self.select(&request).await?;
            let fetched = response.response.docs.len();

            for doc in &response.response.docs {
                let Some(severity) =
                    mapper::int_field(doc, FIELD_SEVERITY).and_then(EventSeverity::from_ordinal)
                else {
                    continue;
                };
                let status = mapper::int_field(doc, FIELD_STATUS)
                    .and_then(EventStatus::from_ordinal)
                    .unwrap_or(EventStatus::New);
                let count = mapper::int_field(doc, FIELD_COUNT).unwrap_or(1).max(0) as u64;
                let element = mapper::str_values(doc, FIELD_ELEMENT_UUID).into_iter().next();
                accumulator.update_indexed(
                    element,
                    mapper::str_values(doc, FIELD_TAGS),
                    severity,
                    count,
                    status,
                );
            }

            offset += fetched;
            if fetched == 0 || offset as u64 >= response.response.num_found {
                return Ok(());
            }
        }
    }
}

fn summaries(page: Page<Map<String, Value>>) -> Result<Page<EventSummary>> {
    page.try_map(|doc| mapper::decode_summary(&doc))
}

fn keys(page: Page<Map<String, Value>>) -> Result<Page<EventKey>> {
    page.try_map(|doc| mapper::decode_key(&doc))
}

#[async_trait]
impl EventIndexBackend for RemoteBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn shape(&self) -> DocumentShape {
        self.shape
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn ping(&self) -> bool {
        if !self.is_ready() {
            return false;
        }
        match self.client.ping().await {
            Ok(()) => true,
            Err(e) => {
                debug!(backend = %self.name, error = %e, "Remote ping failed");
                false
            }
        }
    }

    async fn count(&self) -> Result<u64> {
        self.require_ready()?;
        let request = SelectRequest::new(clauses::MATCH_ALL).page(0, 0);
        Ok(self.select(&request).await?.response.num_found)
    }

    async fn size_in_bytes(&self) -> i64 {
        -1
    }

    async fn index(&self, summary: &EventSummary) -> Result<()> {
        self.index_many(std::slice::from_ref(summary)).await
    }

    async fn index_many(&self, summaries: &[EventSummary]) -> Result<()> {
        if summaries.is_empty() || !self.accept_write("index") {
            return Ok(());
        }
        let docs = summaries
            .iter()
            .map(|summary| mapper::to_remote_doc(summary, self.shape, &self.details))
            .collect::<Result<Vec<_>>>()?;
        self.client
            .add(&docs)
            .await
            .map_err(|e| IndexError::IndexWriteFailure(e.to_string()))?;
        INDEX_METRICS.record_indexed(&self.name, summaries.len());
        debug!(backend = %self.name, documents = summaries.len(), "Summaries indexed");
        Ok(())
    }

    async fn delete(&self, uuid: &Uuid) -> Result<()> {
        self.delete_many(std::slice::from_ref(uuid)).await
    }

    async fn delete_many(&self, uuids: &[Uuid]) -> Result<()> {
        if uuids.is_empty() || !self.accept_write("delete") {
            return Ok(());
        }
        let ids: Vec<String> = uuids.iter().map(Uuid::to_string).collect();
        self.client
            .delete_by_id(&ids)
            .await
            .map_err(|e| IndexError::IndexWriteFailure(e.to_string()))
    }

    async fn flush(&self) -> Result<()> {
        if !self.accept_write("flush") {
            return Ok(());
        }
        self.client
            .commit()
            .await
            .map_err(|e| IndexError::IndexWriteFailure(e.to_string()))
    }

    async fn purge(&self, threshold: DateTime<Utc>) -> Result<()> {
        if !self.accept_write("purge") {
            return Ok(());
        }
        let query = self
            .clauses
            .long_range(FIELD_LAST_SEEN_TIME, None, Some(to_millis(&threshold)))?;
        info!(backend = %self.name, threshold = %threshold, "Purging summaries");
        self.client
            .delete_by_query(&query)
            .await
            .map_err(|e| IndexError::IndexWriteFailure(e.to_string()))?;
        self.flush().await
    }

    async fn clear(&self) -> Result<()> {
        if !self.accept_write("clear") {
            return Ok(());
        }
        self.client
            .delete_by_query(clauses::MATCH_ALL)
            .await
            .map_err(|e| IndexError::IndexWriteFailure(e.to_string()))?;
        self.flush().await?;
        info!(backend = %self.name, "Index cleared");
        Ok(())
    }

    async fn list(&self, request: &EventSummaryRequest) -> Result<Page<EventSummary>> {
        self.require_records()?;
        let query = self.compile(request.filter.as_ref(), request.exclusion.as_ref())?;
        let sort = self.sort(&request.sort)?;
        summaries(
            self.run(query, sort, request.offset, request.limit, FieldSelector::Full)
                .await?,
        )
    }

    async fn list_uuids(&self, request: &EventSummaryRequest) -> Result<Page<EventKey>> {
        let query = self.compile(request.filter.as_ref(), request.exclusion.as_ref())?;
        let sort = self.sort(&request.sort)?;
        keys(
            self.run(query, sort, request.offset, request.limit, FieldSelector::Keys)
                .await?,
        )
    }

    async fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<EventSummary>> {
        self.require_records()?;
        self.find_doc(uuid, FieldSelector::Full)
            .await?
            .map(|doc| mapper::decode_summary(&doc))
            .transpose()
    }

    async fn find_key(&self, uuid: &Uuid) -> Result<Option<EventKey>> {
        self.find_doc(uuid, FieldSelector::Keys)
            .await?
            .map(|doc| mapper::decode_key(&doc))
            .transpose()
    }

    async fn tag_severities(&self, filter: Option<&EventFilter>) -> Result<TagSeverityMap> {
        self.require_ready()?;
        let query = self.compile(filter, None)?;
        let mut accumulator = TagSeverityAccumulator::new(filter);

        if accumulator.is_tag_filtered() {
            self.accumulate_documents(query, &mut accumulator).await?;
        } else {
            let request = SelectRequest::new(query).page(0, 0).pivot(&TAG_PIVOT);
            let response = self.select(&request).await?;
            self.pivot_severities(&response.pivot(&TAG_PIVOT)?, &mut accumulator);
        }
        Ok(accumulator.finish())
    }

    async fn create_saved_search(&self, query: &EventQuery) -> Result<Uuid> {
        self.require_ready()?;
        let timeout = saved_search_timeout(query.timeout_secs)?;
        let saved = SavedQuery {
            query: self.compile(query.filter.as_ref(), query.exclusion.as_ref())?,
            sort: self.sort(&query.sort)?,
        };
        Ok(self.saved.insert(saved, timeout))
    }

    async fn saved_search(&self, id: &Uuid, offset: i64, limit: i64) -> Result<Page<EventSummary>> {
        self.require_records()?;
        let page = self
            .saved
            .read(id, |saved| async move {
                self.run(
                    saved.query.clone(),
                    saved.sort.clone(),
                    offset,
                    limit,
                    FieldSelector::Full,
                )
                .await
            })
            .await?;
        summaries(page)
    }

    async fn saved_search_uuids(
        &self,
        id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Page<EventKey>> {
        let page = self
            .saved
            .read(id, |saved| async move {
                self.run(
                    saved.query.clone(),
                    saved.sort.clone(),
                    offset,
                    limit,
                    FieldSelector::Keys,
                )
                .await
            })
            .await?;
        keys(page)
    }

    fn hold_saved_search(&self, id: &Uuid) -> Result<SavedSearchHold> {
        self.saved.hold(id)
    }

    async fn delete_saved_search(&self, id: &Uuid) -> Result<bool> {
        Ok(self.saved.remove(id))
    }

    async fn close(&self) -> Result<()> {
        if let Some(handle) = self.init_task.lock().take() {
            handle.abort();
        }
        self.saved.clear();
        info!(backend = %self.name, "Remote event index closed");
        Ok(())
    }
}

impl Drop for RemoteBackend {
    fn drop(&mut self) {
        if let Some(handle) = self.init_task.lock().take() {
            handle.abort();
        }
    }
}
