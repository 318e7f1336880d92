//! The contract every index backend implements

use crate::error::Result;
use crate::index::document::DocumentShape;
use crate::index::saved_search::SavedSearchHold;
use crate::models::{
    EventFilter, EventKey, EventQuery, EventSummary, EventSummaryRequest, Page, TagSeverityMap,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// What a read materializes for each hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldSelector {
    /// The full stored summary
    Full,
    /// Uuid and last seen time only
    Keys,
}

/// An event index backend.
///
/// Writes may stay invisible until [`flush`](Self::flush). Reads on an
/// archive-shaped backend are limited to keys; full records are resolved
/// by the caller.
#[async_trait]
pub trait EventIndexBackend: Send + Sync {
    /// Name used in logs and metric labels
    fn name(&self) -> &str;

    fn shape(&self) -> DocumentShape;

    /// Whether initialization (and warm-up) completed
    fn is_ready(&self) -> bool;

    /// Whether the backend can be reached; never fails
    async fn ping(&self) -> bool;

    /// Number of live documents
    async fn count(&self) -> Result<u64>;

    /// Total size of the index files, or -1 when unknown
    async fn size_in_bytes(&self) -> i64;

    /// Add or replace a summary, keyed by its uuid
    async fn index(&self, summary: &EventSummary) -> Result<()>;

    async fn index_many(&self, summaries: &[EventSummary]) -> Result<()>;

    async fn delete(&self, uuid: &Uuid) -> Result<()>;

    async fn delete_many(&self, uuids: &[Uuid]) -> Result<()>;

    /// Persist pending writes and make them visible to new readers
    async fn flush(&self) -> Result<()>;

    /// Remove every summary last seen at or before `threshold`
    async fn purge(&self, threshold: DateTime<Utc>) -> Result<()>;

    async fn clear(&self) -> Result<()>;

    async fn list(&self, request: &EventSummaryRequest) -> Result<Page<EventSummary>>;

    async fn list_uuids(&self, request: &EventSummaryRequest) -> Result<Page<EventKey>>;

    async fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<EventSummary>>;

    async fn find_key(&self, uuid: &Uuid) -> Result<Option<EventKey>>;

    async fn tag_severities(&self, filter: Option<&EventFilter>) -> Result<TagSeverityMap>;

    async fn create_saved_search(&self, query: &EventQuery) -> Result<Uuid>;

    async fn saved_search(&self, id: &Uuid, offset: i64, limit: i64)
        -> Result<Page<EventSummary>>;

    async fn saved_search_uuids(&self, id: &Uuid, offset: i64, limit: i64)
        -> Result<Page<EventKey>>;

    /// Keep a saved search from expiring while its hits are resolved
    fn hold_saved_search(&self, id: &Uuid) -> Result<SavedSearchHold>;

    /// `false` when the handle was unknown or already expired
    async fn delete_saved_search(&self, id: &Uuid) -> Result<bool>;

    /// Release every saved search and stop background work
    async fn close(&self) -> Result<()>;
}
