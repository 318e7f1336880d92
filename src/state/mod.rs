pub mod store;

pub use store::*;

use crate::error::Result;
use crate::models::EventSummary;
use async_trait::async_trait;
use uuid::Uuid;

/// Relational summary/archive storage consumed by the index.
///
/// Rows are fetched by uuid; `find_by_uuids` makes no ordering promise.
#[async_trait]
pub trait EventSummaryStore: Send + Sync {
    /// Find a summary by uuid
    async fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<EventSummary>>;

    /// Find all summaries whose uuid is in `uuids`, in any order
    async fn find_by_uuids(&self, uuids: &[Uuid]) -> Result<Vec<EventSummary>>;
}
