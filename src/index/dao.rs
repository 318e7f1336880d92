//! Index DAO: one backend with its purpose.
//!
//! A summary-purpose DAO answers reads from the stored records. An
//! archive-purpose DAO reads keys from the index and rebuilds records from
//! the relational store through an [`ArchiveReconciler`].

use crate::config::Config;
use crate::error::{IndexError, Result};
use crate::index::backend::EventIndexBackend;
use crate::index::document::DocumentShape;
use crate::index::embedded::EmbeddedBackend;
use crate::index::reconcile::ArchiveReconciler;
use crate::index::remote::RemoteBackend;
use crate::models::{
    EventFilter, EventKey, EventQuery, EventSummary, EventSummaryRequest, Page, TagSeverityMap,
};
use crate::state::EventSummaryStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

pub const SUMMARY_INDEX: &str = "event_summary";
pub const ARCHIVE_INDEX: &str = "event_archive";

/// Data access over one event index
#[derive(Clone)]
pub struct EventIndexDao {
    name: String,
    backend: Arc<dyn EventIndexBackend>,
    reconciler: Option<ArchiveReconciler>,
    realtime: bool,
}

impl EventIndexDao {
    /// DAO over a summary-shape backend
    pub fn summary(backend: Arc<dyn EventIndexBackend>, realtime: bool) -> Self {
        Self {
            name: backend.name().to_string(),
            backend,
            reconciler: None,
            realtime,
        }
    }

    /// DAO over an archive-shape backend, resolving records from `store`
    pub fn archive(
        backend: Arc<dyn EventIndexBackend>,
        store: Arc<dyn EventSummaryStore>,
        lookup_timeout: Duration,
        realtime: bool,
    ) -> Self {
        let reconciler = ArchiveReconciler::new(backend.name(), store, lookup_timeout);
        Self {
            name: backend.name().to_string(),
            backend,
            reconciler: Some(reconciler),
            realtime,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend(&self) -> &Arc<dyn EventIndexBackend> {
        &self.backend
    }

    /// Reconciler of an archive-shape backend; summary backends have none
    fn reconciler(&self) -> Option<Result<&ArchiveReconciler>> {
        match self.backend.shape() {
            DocumentShape::Summary => None,
            DocumentShape::Archive => Some(self.reconciler.as_ref().ok_or_else(|| {
                IndexError::Configuration(format!("{} has no relational store", self.name))
            })),
        }
    }

    async fn after_write(&self) -> Result<()> {
        if self.realtime {
            self.backend.flush().await?;
        }
        Ok(())
    }

    pub async fn index(&self, summary: &EventSummary) -> Result<()> {
        self.backend.index(summary).await?;
        self.after_write().await
    }

    pub async fn index_many(&self, summaries: &[EventSummary]) -> Result<()> {
        if summaries.is_empty() {
            return Ok(());
        }
        self.backend.index_many(summaries).await?;
        self.after_write().await
    }

    pub async fn delete(&self, uuid: &Uuid) -> Result<()> {
        self.backend.delete(uuid).await?;
        self.after_write().await
    }

    pub async fn delete_many(&self, uuids: &[Uuid]) -> Result<()> {
        if uuids.is_empty() {
            return Ok(());
        }
        self.backend.delete_many(uuids).await?;
        self.after_write().await
    }

    pub async fn flush(&self) -> Result<()> {
        self.backend.flush().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    /// Delete every summary last seen at or before `older_than`
    pub async fn purge(&self, older_than: DateTime<Utc>) -> Result<()> {
        self.backend.purge(older_than).await
    }

    pub async fn list(&self, request: &EventSummaryRequest) -> Result<Page<EventSummary>> {
        match self.reconciler() {
            None => self.backend.list(request).await,
            Some(reconciler) => {
                let keys = self.backend.list_uuids(request).await?;
                self.resolve(reconciler?, keys).await
            }
        }
    }

    /// Identity fields only; never touches the relational store
    pub async fn list_uuids(&self, request: &EventSummaryRequest) -> Result<Page<EventKey>> {
        self.backend.list_uuids(request).await
    }

    pub async fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<EventSummary>> {
        match self.reconciler() {
            None => self.backend.find_by_uuid(uuid).await,
            Some(reconciler) => {
                let reconciler = reconciler?;
                match self.backend.find_key(uuid).await? {
                    Some(key) => reconciler.find_by_uuid(&key.uuid).await,
                    None => Ok(None),
                }
            }
        }
    }

    pub async fn create_saved_search(&self, query: &EventQuery) -> Result<Uuid> {
        let id = self.backend.create_saved_search(query).await?;
        debug!(index = %self.name, saved_search = %id, "Saved search created");
        Ok(id)
    }

    pub async fn saved_search_read(
        &self,
        id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Page<EventSummary>> {
        match self.reconciler() {
            None => self.backend.saved_search(id, offset, limit).await,
            Some(reconciler) => {
                let reconciler = reconciler?;
                let _hold = self.backend.hold_saved_search(id)?;
                let keys = self.backend.saved_search_uuids(id, offset, limit).await?;
                self.resolve(reconciler, keys).await
            }
        }
    }

    pub async fn saved_search_read_uuids(
        &self,
        id: &Uuid,
        offset: i64,
        limit: i64,
    ) -> Result<Page<EventKey>> {
        self.backend.saved_search_uuids(id, offset, limit).await
    }

    /// `false` when the handle was unknown or already gone
    pub async fn delete_saved_search(&self, id: &Uuid) -> Result<bool> {
        self.backend.delete_saved_search(id).await
    }

    pub async fn get_event_tag_severities(
        &self,
        filter: Option<&EventFilter>,
    ) -> Result<TagSeverityMap> {
        self.backend.tag_severities(filter).await
    }

    pub fn is_ready(&self) -> bool {
        self.backend.is_ready()
    }

    pub async fn ping(&self) -> bool {
        self.backend.ping().await
    }

    pub async fn count(&self) -> Result<u64> {
        self.backend.count().await
    }

    pub async fn size_in_bytes(&self) -> i64 {
        self.backend.size_in_bytes().await
    }

    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }

    /// Replace keys with records; the total stays the index count
    async fn resolve(
        &self,
        reconciler: &ArchiveReconciler,
        keys: Page<EventKey>,
    ) -> Result<Page<EventSummary>> {
        let events = reconciler.resolve(&keys.events).await?;
        Ok(Page {
            total: keys.total,
            limit: keys.limit,
            next_offset: keys.next_offset,
            events,
        })
    }
}

/// The summary and archive indexes of one deployment
#[derive(Clone)]
pub struct EventIndexes {
    pub summary: EventIndexDao,
    pub archive: EventIndexDao,
}

impl EventIndexes {
    /// Open both indexes: remote when configured, embedded otherwise
    pub async fn open(config: &Config, store: Arc<dyn EventSummaryStore>) -> Result<Self> {
        let details = config.indexed_details();
        let lookup_timeout = Duration::from_millis(config.archive.lookup_timeout_ms);
        let realtime = config.index.realtime_indexing;

        let (summary, archive): (Arc<dyn EventIndexBackend>, Arc<dyn EventIndexBackend>) =
            match &config.remote {
                Some(remote) => {
                    let mut archive_remote = remote.clone();
                    archive_remote.collection = format!("{}_archive", remote.collection);
                    (
                        Arc::new(RemoteBackend::start(
                            SUMMARY_INDEX,
                            DocumentShape::Summary,
                            remote.clone(),
                            &details,
                            config.index.max_clause_count,
                        )?),
                        Arc::new(RemoteBackend::start(
                            ARCHIVE_INDEX,
                            DocumentShape::Archive,
                            archive_remote,
                            &details,
                            config.index.max_clause_count,
                        )?),
                    )
                }
                None => (
                    Arc::new(
                        EmbeddedBackend::open(
                            SUMMARY_INDEX,
                            DocumentShape::Summary,
                            config.index.clone(),
                            &details,
                        )
                        .await?,
                    ),
                    Arc::new(
                        EmbeddedBackend::open(
                            ARCHIVE_INDEX,
                            DocumentShape::Archive,
                            config.archive_index_config(),
                            &details,
                        )
                        .await?,
                    ),
                ),
            };

        info!(
            remote = config.remote.is_some(),
            details = details.len(),
            "Event indexes opened"
        );
        Ok(Self {
            summary: EventIndexDao::summary(summary, realtime),
            archive: EventIndexDao::archive(archive, store, lookup_timeout, realtime),
        })
    }

    pub async fn close(&self) -> Result<()> {
        futures::try_join!(self.summary.close(), self.archive.close())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArchiveConfig, ObservabilityConfig};
    use crate::index::config::IndexConfigBuilder;
    use crate::models::{Event, EventSeverity, IndexedDetails};
    use crate::state::InMemoryEventStore;
    use tempfile::TempDir;

    async fn embedded(dir: &TempDir, name: &str, shape: DocumentShape) -> Arc<dyn EventIndexBackend> {
        let config = IndexConfigBuilder::new()
            .index_path(dir.path().join(name))
            .writer_heap_size(15_000_000)
            .refresh_interval_ms(0)
            .build();
        Arc::new(
            EmbeddedBackend::open(name, shape, config, &IndexedDetails::default())
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_realtime_writes_are_visible() {
        let dir = TempDir::new().unwrap();
        let dao = EventIndexDao::summary(embedded(&dir, "summary", DocumentShape::Summary).await, true);
        let summary = EventSummary::new(Event::new("visible", EventSeverity::Info));

        dao.index(&summary).await.unwrap();
        assert_eq!(dao.count().await.unwrap(), 1);
        assert_eq!(dao.find_by_uuid(&summary.uuid).await.unwrap(), Some(summary.clone()));

        dao.delete(&summary.uuid).await.unwrap();
        assert_eq!(dao.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_archive_find_goes_through_store() {
        let dir = TempDir::new().unwrap();
        let store = InMemoryEventStore::new();
        let dao = EventIndexDao::archive(
            embedded(&dir, "archive", DocumentShape::Archive).await,
            Arc::new(store.clone()),
            Duration::from_secs(1),
            true,
        );

        let kept = store.record_occurrence(Event::new("kept", EventSeverity::Info));
        let mut gone_event = Event::new("gone", EventSeverity::Info);
        gone_event.fingerprint = "gone".to_string();
        let gone = store.record_occurrence(gone_event);
        dao.index_many(&[kept.clone(), gone.clone()]).await.unwrap();
        store.remove(&gone.uuid);

        assert_eq!(dao.find_by_uuid(&kept.uuid).await.unwrap(), Some(kept));
        assert_eq!(dao.find_by_uuid(&gone.uuid).await.unwrap(), None);
        assert_eq!(dao.find_by_uuid(&Uuid::new_v4()).await.unwrap(), None);

        let page = dao.list(&EventSummaryRequest::default()).await.unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.events.len(), 1);
    }

    #[tokio::test]
    async fn test_open_embedded_indexes() {
        let dir = TempDir::new().unwrap();
        let config = Config {
            index: IndexConfigBuilder::new()
                .index_path(dir.path().join("summary"))
                .writer_heap_size(15_000_000)
                .refresh_interval_ms(0)
                .realtime_indexing(true)
                .warm_on_start(false)
                .build(),
            archive: ArchiveConfig {
                index_path: dir.path().join("archive"),
                lookup_timeout_ms: 1000,
            },
            remote: None,
            details: Vec::new(),
            observability: ObservabilityConfig::default(),
        };
        let indexes = EventIndexes::open(&config, Arc::new(InMemoryEventStore::new()))
            .await
            .unwrap();
        assert_eq!(indexes.summary.name(), SUMMARY_INDEX);
        assert_eq!(indexes.archive.backend().shape(), DocumentShape::Archive);

        let summary = EventSummary::new(Event::new("opened", EventSeverity::Warning));
        indexes.summary.index(&summary).await.unwrap();
        assert_eq!(indexes.summary.count().await.unwrap(), 1);
        assert_eq!(indexes.archive.count().await.unwrap(), 0);

        indexes.close().await.unwrap();
        assert!(!indexes.summary.is_ready());
    }
}
