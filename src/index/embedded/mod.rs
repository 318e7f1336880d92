//! Embedded tantivy backend.
//!
//! One directory per index. Writes go through a single writer; readers are
//! pinned generations from a [`SnapshotPool`], refreshed in the background
//! or on every acquire.

pub mod clauses;
pub mod schema;
mod search;
mod tags;

pub use clauses::{Clause, TantivyClauses};
pub use schema::{build_event_schema, detail_field_name, EventSchema};

use crate::error::{IndexError, Result};
use crate::index::backend::{EventIndexBackend, FieldSelector};
use crate::index::cache::ClauseCache;
use crate::index::config::IndexConfig;
use crate::index::constants::*;
use crate::index::document::DocumentShape;
use crate::index::materializer::PageWindow;
use crate::index::metrics::INDEX_METRICS;
use crate::index::query::QueryCompiler;
use crate::index::saved_search::{saved_search_timeout, SavedSearchHold, SavedSearchRegistry};
use crate::index::snapshot::{Snapshot, SnapshotLoader, SnapshotPool};
use crate::index::sort::{map_sorts, SortKeySpec};
use crate::index::tag_severity::TagSeverityAccumulator;
use crate::models::{
    to_millis, EventFilter, EventKey, EventQuery, EventSeverity, EventSort, EventStatus,
    EventSummary, EventSummaryRequest, IndexedDetails, Page, SortDirection, SortField,
    TagSeverityMap,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use search::{run_blocking, SortedCollector};
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tantivy::query::{RangeQuery, TermQuery};
use tantivy::schema::IndexRecordOption;
use tantivy::{Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Rows read by the start-up warm-up search
const WARM_UP_LIMIT: i64 = 1000;

/// State pinned by a saved search
struct SavedState {
    snapshot: Snapshot<Searcher>,
    query: Clause,
    sort: Arc<[SortKeySpec]>,
}

/// Tantivy-backed event index
pub struct EmbeddedBackend {
    name: String,
    shape: DocumentShape,
    config: IndexConfig,
    schema: Arc<EventSchema>,
    writer: Arc<RwLock<IndexWriter>>,
    committed: Arc<AtomicU64>,
    pool: SnapshotPool<Searcher>,
    clauses: ClauseCache<Clause>,
    saved: SavedSearchRegistry<SavedState>,
    ready: AtomicBool,
}

impl EmbeddedBackend {
    /// Open (or create) the index under `config.index_path`
    pub async fn open(
        name: impl Into<String>,
        shape: DocumentShape,
        config: IndexConfig,
        details: &IndexedDetails,
    ) -> Result<Self> {
        let name = name.into();

        // Create index directory if it doesn't exist
        std::fs::create_dir_all(&config.index_path).map_err(|e| {
            IndexError::Configuration(format!("Failed to create index directory: {}", e))
        })?;

        let schema = Arc::new(EventSchema::new(details));

        // Open or create index
        let index = if Self::index_exists(&config.index_path) {
            let index = Index::open_in_dir(&config.index_path).map_err(|e| {
                IndexError::Configuration(format!("Failed to open existing index: {}", e))
            })?;
            Self::check_schema(&index, &schema)?;
            index
        } else {
            Index::create_in_dir(&config.index_path, schema.schema().clone()).map_err(|e| {
                IndexError::Configuration(format!("Failed to create new index: {}", e))
            })?
        };

        let writer: IndexWriter = index
            .writer(config.writer_heap_size)
            .map_err(|e| IndexError::Configuration(format!("Failed to create writer: {}", e)))?;

        let reader: IndexReader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| IndexError::Configuration(format!("Failed to create reader: {}", e)))?;

        let committed = Arc::new(AtomicU64::new(index.load_metas()?.opstamp));
        let pool = SnapshotPool::new(name.clone(), Self::loader(reader, Arc::clone(&committed)))?;
        if let Some(interval) = config.refresh_interval() {
            pool.start_refresh(interval);
        }

        let backend = Self {
            saved: SavedSearchRegistry::new(name.clone())?,
            clauses: ClauseCache::new(config.clause_cache_capacity),
            name,
            shape,
            schema,
            writer: Arc::new(RwLock::new(writer)),
            committed,
            pool,
            ready: AtomicBool::new(false),
            config,
        };

        info!(
            backend = %backend.name,
            shape = backend.shape.label(),
            path = %backend.config.index_path.display(),
            index_version = INDEX_VERSION,
            details = backend.schema.details().len(),
            "Event index opened"
        );

        if backend.config.warm_on_start {
            backend.warm_up().await;
        }
        backend.ready.store(true, Ordering::SeqCst);
        Ok(backend)
    }

    /// Check if an index exists at the given path
    fn index_exists(path: &Path) -> bool {
        path.join("meta.json").exists()
    }

    /// Every field of the configured schema must exist on disk
    fn check_schema(index: &Index, schema: &EventSchema) -> Result<()> {
        let on_disk = index.schema();
        for (_, entry) in schema.schema().fields() {
            if on_disk.get_field(entry.name()).is_err() {
                return Err(IndexError::Configuration(format!(
                    "Index is missing field {}; rebuild it for the current detail configuration",
                    entry.name()
                )));
            }
        }
        Ok(())
    }

    /// Reload only when a commit landed since the installed generation
    fn loader(reader: IndexReader, committed: Arc<AtomicU64>) -> SnapshotLoader<Searcher> {
        Box::new(move |installed| {
            let version = committed.load(Ordering::SeqCst);
            if installed == Some(version) {
                return Ok(None);
            }
            reader.reload()?;
            Ok(Some((version, reader.searcher())))
        })
    }

    /// Search the most common console query once so caches are hot
    async fn warm_up(&self) {
        let request = EventSummaryRequest::new(Some(
            EventFilter::new()
                .with_status(EventStatus::ALL)
                .with_severity(EventSeverity::ALL),
        ))
        .with_sort(EventSort::new(SortField::Severity, SortDirection::Descending))
        .with_sort(EventSort::new(SortField::LastSeen, SortDirection::Descending))
        .with_page(0, WARM_UP_LIMIT);

        let started = std::time::Instant::now();
        match self.list_uuids(&request).await {
            Ok(page) => info!(
                backend = %self.name,
                total = page.total,
                duration_ms = started.elapsed().as_millis() as u64,
                "Index warmed up"
            ),
            Err(e) => warn!(backend = %self.name, error = %e, "Index warm-up failed"),
        }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Reader generations not yet closed
    pub fn open_generations(&self) -> usize {
        self.pool.open_generations()
    }

    pub fn saved_search_count(&self) -> usize {
        self.saved.len()
    }

    fn acquire(&self) -> Result<Snapshot<Searcher>> {
        self.pool.acquire().map_err(|e| self.on_read_error(e))
    }

    /// Poison the read path on resource exhaustion
    fn poison_on_exhaustion(&self, err: &IndexError) {
        if err.is_resource_exhaustion() && !self.pool.is_poisoned() {
            error!(backend = %self.name, error = %err, "Resource exhaustion, poisoning readers");
            self.pool.poison();
        }
    }

    fn on_read_error(&self, err: IndexError) -> IndexError {
        self.poison_on_exhaustion(&err);
        err
    }

    fn on_write_error(&self, err: tantivy::TantivyError) -> IndexError {
        let err = IndexError::from(err);
        self.poison_on_exhaustion(&err);
        match err {
            IndexError::ResourceExhaustion(_) => err,
            other => IndexError::IndexWriteFailure(other.to_string()),
        }
    }

    fn compile(
        &self,
        snapshot: &Searcher,
        filter: Option<&EventFilter>,
        exclusion: Option<&EventFilter>,
    ) -> Result<Clause> {
        let factory = TantivyClauses::new(
            &self.schema,
            snapshot,
            &self.clauses,
            self.config.max_clause_count,
        );
        let clause = QueryCompiler::new(&factory, self.schema.details()).compile(filter, exclusion)?;
        debug!(backend = %self.name, query = ?clause, "Compiled query");
        Ok(clause)
    }

    fn sort_keys(&self, sort: &[EventSort]) -> Result<Arc<[SortKeySpec]>> {
        Ok(map_sorts(sort, self.schema.details(), detail_field_name)?.into())
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

    /// Run a sorted search and load the stored documents of one window
    async fn search(
        &self,
        snapshot: Snapshot<Searcher>,
        query: Clause,
        sort: Arc<[SortKeySpec]>,
        window: PageWindow,
    ) -> Result<Page<TantivyDocument>> {
        run_blocking(&self.name, self.config.search_timeout(), move || {
            let hits = snapshot.search(query.query(), &SortedCollector::new(sort, window.fetch()))?;
            let page = window.assemble(hits.total, hits.docs);
            Ok(page.try_map(|address| snapshot.doc::<TantivyDocument>(address))?)
        })
        .await
        .map_err(|e| self.on_read_error(e))
    }

    fn decode(&self, page: Page<TantivyDocument>, fields: FieldSelector) -> Result<Page<Decoded>> {
        page.try_map(|doc| match fields {
            FieldSelector::Full => self.schema.decode_summary(&doc).map(Decoded::Summary),
            FieldSelector::Keys => self.schema.decode_key(&doc).map(Decoded::Key),
        })
    }

    async fn run_request(
        &self,
        request: &EventSummaryRequest,
        fields: FieldSelector,
    ) -> Result<Page<Decoded>> {
        let window = PageWindow::new(request.offset, request.limit, self.config.query_limit)?;
        let sort = self.sort_keys(&request.sort)?;
        let snapshot = self.acquire()?;
        let query = self.compile(&snapshot, request.filter.as_ref(), request.exclusion.as_ref())?;
        let page = self.search(snapshot, query, sort, window).await?;
        self.decode(page, fields)
    }

    async fn run_saved(
        &self,
        id: &Uuid,
        offset: i64,
        limit: i64,
        fields: FieldSelector,
    ) -> Result<Page<Decoded>> {
        let window = PageWindow::new(offset, limit, self.config.query_limit)?;
        let page = self
            .saved
            .read(id, |state| async move {
                self.search(
                    state.snapshot.clone(),
                    state.query.clone(),
                    Arc::clone(&state.sort),
                    window,
                )
                .await
            })
            .await?;
        self.decode(page, fields)
    }

    async fn find_doc(&self, uuid: &Uuid) -> Result<Option<TantivyDocument>> {
        let field = self.schema.field(FIELD_UUID)?;
        let query = TermQuery::new(
            Term::from_field_text(field, &uuid.to_string()),
            IndexRecordOption::Basic,
        );
        let snapshot = self.acquire()?;
        let window = PageWindow::new(0, 1, 1)?;
        let page = self
            .search(snapshot, Clause::new(query), self.sort_keys(&[])?, window)
            .await?;
        Ok(page.events.into_iter().next())
    }

    async fn commit(&self) -> Result<()> {
        let mut writer = self.writer.write().await;
        let opstamp = writer.commit().map_err(|e| self.on_write_error(e))?;
        self.committed.fetch_max(opstamp, Ordering::SeqCst);
        Ok(())
    }

    fn uuid_term(&self, uuid: &Uuid) -> Result<Term> {
        Ok(Term::from_field_text(self.schema.field(FIELD_UUID)?, &uuid.to_string()))
    }
}

/// A decoded hit of either field selection
enum Decoded {
    Summary(EventSummary),
    Key(EventKey),
}

fn summaries(page: Page<Decoded>) -> Result<Page<EventSummary>> {
    page.try_map(|d| match d {
        Decoded::Summary(summary) => Ok(summary),
        Decoded::Key(key) => Err(IndexError::Internal(format!(
            "Expected a full record for {}",
            key.uuid
        ))),
    })
}

fn keys(page: Page<Decoded>) -> Page<EventKey> {
    page.map(|d| match d {
        Decoded::Summary(summary) => EventKey::from(&summary),
        Decoded::Key(key) => key,
    })
}

#[async_trait]
impl EventIndexBackend for EmbeddedBackend {
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
        true
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.acquire()?.num_docs())
    }

    async fn size_in_bytes(&self) -> i64 {
        match std::fs::read_dir(&self.config.index_path) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .filter(|m| m.is_file())
                .map(|m| m.len() as i64)
                .sum(),
            Err(e) => {
                warn!(backend = %self.name, error = %e, "Failed to read index directory");
                -1
            }
        }
    }

    async fn index(&self, summary: &EventSummary) -> Result<()> {
        self.index_many(std::slice::from_ref(summary)).await
    }

    async fn index_many(&self, summaries: &[EventSummary]) -> Result<()> {
        if summaries.is_empty() {
            return Ok(());
        }
        let docs = summaries
            .iter()
            .map(|summary| Ok((summary.uuid, self.schema.to_tantivy_doc(summary, self.shape)?)))
            .collect::<Result<Vec<_>>>()?;

        let writer = self.writer.read().await;
        for (uuid, doc) in docs {
            // Delete existing document with same uuid first
            writer.delete_term(self.uuid_term(&uuid)?);
            writer.add_document(doc).map_err(|e| self.on_write_error(e))?;
        }
        INDEX_METRICS.record_indexed(&self.name, summaries.len());
        debug!(backend = %self.name, documents = summaries.len(), "Summaries indexed");
        Ok(())
    }

    async fn delete(&self, uuid: &Uuid) -> Result<()> {
        self.delete_many(std::slice::from_ref(uuid)).await
    }

    async fn delete_many(&self, uuids: &[Uuid]) -> Result<()> {
        let writer = self.writer.read().await;
        for uuid in uuids {
            writer.delete_term(self.uuid_term(uuid)?);
        }
        debug!(backend = %self.name, documents = uuids.len(), "Summaries deleted");
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        self.commit().await
    }

    async fn purge(&self, threshold: DateTime<Utc>) -> Result<()> {
        let query = RangeQuery::new_i64_bounds(
            FIELD_LAST_SEEN_TIME.to_string(),
            Bound::Unbounded,
            Bound::Included(to_millis(&threshold)),
        );
        {
            let writer = self.writer.read().await;
            writer
                .delete_query(Box::new(query))
                .map_err(|e| self.on_write_error(e))?;
        }
        self.commit().await?;
        info!(backend = %self.name, threshold = %threshold, "Purged summaries");
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        {
            let writer = self.writer.read().await;
            writer
                .delete_all_documents()
                .map_err(|e| self.on_write_error(e))?;
        }
        self.commit().await?;
        self.clauses.invalidate_all();
        info!(backend = %self.name, "Index cleared");
        Ok(())
    }

    async fn list(&self, request: &EventSummaryRequest) -> Result<Page<EventSummary>> {
        self.require_records()?;
        summaries(self.run_request(request, FieldSelector::Full).await?)
    }

    async fn list_uuids(&self, request: &EventSummaryRequest) -> Result<Page<EventKey>> {
        Ok(keys(self.run_request(request, FieldSelector::Keys).await?))
    }

    async fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<EventSummary>> {
        self.require_records()?;
        self.find_doc(uuid)
            .await?
            .map(|doc| self.schema.decode_summary(&doc))
            .transpose()
    }

    async fn find_key(&self, uuid: &Uuid) -> Result<Option<EventKey>> {
        self.find_doc(uuid)
            .await?
            .map(|doc| self.schema.decode_key(&doc))
            .transpose()
    }

    async fn tag_severities(&self, filter: Option<&EventFilter>) -> Result<TagSeverityMap> {
        let snapshot = self.acquire()?;
        let query = self.compile(&snapshot, filter, None)?;
        let accumulator = TagSeverityAccumulator::new(filter);
        let schema = Arc::clone(&self.schema);
        let shape = self.shape;

        let accumulator = run_blocking(&self.name, self.config.search_timeout(), move || {
            tags::aggregate_tags(&snapshot, &schema, shape, query.query(), accumulator)
        })
        .await
        .map_err(|e| self.on_read_error(e))?;
        Ok(accumulator.finish())
    }

    async fn create_saved_search(&self, query: &EventQuery) -> Result<Uuid> {
        let timeout = saved_search_timeout(query.timeout_secs)?;
        let sort = self.sort_keys(&query.sort)?;
        let snapshot = self.acquire()?;
        let clause = self.compile(&snapshot, query.filter.as_ref(), query.exclusion.as_ref())?;
        Ok(self.saved.insert(
            SavedState {
                snapshot,
                query: clause,
                sort,
            },
            timeout,
        ))
    }

    async fn saved_search(&self, id: &Uuid, offset: i64, limit: i64) -> Result<Page<EventSummary>> {
        self.require_records()?;
        summaries(self.run_saved(id, offset, limit, FieldSelector::Full).await?)
    }

    async fn saved_search_uuids(
        &self,
        id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Page<EventKey>> {
        Ok(keys(self.run_saved(id, offset, limit, FieldSelector::Keys).await?))
    }

    fn hold_saved_search(&self, id: &Uuid) -> Result<SavedSearchHold> {
        self.saved.hold(id)
    }

    async fn delete_saved_search(&self, id: &Uuid) -> Result<bool> {
        Ok(self.saved.remove(id))
    }

    async fn close(&self) -> Result<()> {
        self.ready.store(false, Ordering::SeqCst);
        self.saved.clear();
        let committed = self.commit().await;
        self.pool.close();
        info!(backend = %self.name, "Event index closed");
        committed
    }
}
