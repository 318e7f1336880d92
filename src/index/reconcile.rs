//! Resolution of archive index hits against the relational store

use crate::error::{IndexError, Result};
use crate::index::metrics::INDEX_METRICS;
use crate::models::{EventKey, EventSummary};
use crate::state::EventSummaryStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Rebuilds archived summaries from their index keys.
///
/// The archive index stores identity fields only; full records come from
/// the relational store, which answers batch lookups in any order.
#[derive(Clone)]
pub struct ArchiveReconciler {
    backend: String,
    store: Arc<dyn EventSummaryStore>,
    lookup_timeout: Duration,
}

impl ArchiveReconciler {
    pub fn new(
        backend: impl Into<String>,
        store: Arc<dyn EventSummaryStore>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            backend: backend.into(),
            store,
            lookup_timeout,
        }
    }

    /// Summaries for `keys`, in the same order; rows missing from the store
    /// are logged and skipped
    pub async fn resolve(&self, keys: &[EventKey]) -> Result<Vec<EventSummary>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut slots: Vec<(Uuid, Option<EventSummary>)> =
            keys.iter().map(|k| (k.uuid, None)).collect();
        let positions: HashMap<Uuid, usize> = slots
            .iter()
            .enumerate()
            .map(|(idx, (uuid, _))| (*uuid, idx))
            .collect();
        let uuids: Vec<Uuid> = slots.iter().map(|(uuid, _)| *uuid).collect();

        for summary in self.lookup(&uuids).await? {
            if let Some(&idx) = positions.get(&summary.uuid) {
                slots[idx].1 = Some(summary);
            }
        }

        let missing: Vec<Uuid> = slots
            .iter()
            .filter(|(_, summary)| summary.is_none())
            .map(|(uuid, _)| *uuid)
            .collect();
        if !missing.is_empty() {
            self.drift(&missing);
        }

        Ok(slots.into_iter().filter_map(|(_, summary)| summary).collect())
    }

    /// Single-row lookup; a missing row is drift and yields `None`
    pub async fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<EventSummary>> {
        let found = tokio::time::timeout(self.lookup_timeout, self.store.find_by_uuid(uuid))
            .await
            .map_err(|_| self.timed_out(1))??;
        if found.is_none() {
            self.drift(&[*uuid]);
        }
        Ok(found)
    }

    async fn lookup(&self, uuids: &[Uuid]) -> Result<Vec<EventSummary>> {
        let started = std::time::Instant::now();
        let rows = tokio::time::timeout(self.lookup_timeout, self.store.find_by_uuids(uuids))
            .await
            .map_err(|_| self.timed_out(uuids.len()))??;
        debug!(
            backend = %self.backend,
            requested = uuids.len(),
            found = rows.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Archive rows fetched"
        );
        Ok(rows)
    }

    fn drift(&self, missing: &[Uuid]) {
        warn!(
            backend = %self.backend,
            missing = missing.len(),
            first = %missing[0],
            "Index hits without a relational row"
        );
        INDEX_METRICS.record_drift(&self.backend, missing.len());
    }

    fn timed_out(&self, rows: usize) -> IndexError {
        IndexError::SearchTimeout(format!(
            "{} archive lookup of {} rows exceeded {}ms",
            self.backend,
            rows,
            self.lookup_timeout.as_millis()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventSeverity};
    use crate::state::InMemoryEventStore;

    fn stored(store: &InMemoryEventStore, n: usize) -> Vec<EventSummary> {
        (0..n)
            .map(|i| {
                let mut event = Event::new(format!("event {}", i), EventSeverity::Info);
                event.actor.element_identifier = format!("host{}", i);
                store.record_occurrence(event)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_preserves_index_order_and_skips_missing() {
        let store = Arc::new(InMemoryEventStore::new());
        let summaries = stored(&store, 10);
        for idx in [1, 4, 8] {
            store.remove(&summaries[idx].uuid);
        }

        // Index order is the reverse of insertion order
        let keys: Vec<EventKey> = summaries.iter().rev().map(EventKey::from).collect();
        let reconciler = ArchiveReconciler::new("archive", store, Duration::from_secs(5));
        let resolved = reconciler.resolve(&keys).await.unwrap();

        let expected: Vec<Uuid> = keys
            .iter()
            .map(|k| k.uuid)
            .filter(|uuid| {
                ![1, 4, 8]
                    .iter()
                    .any(|idx| summaries[*idx].uuid == *uuid)
            })
            .collect();
        let actual: Vec<Uuid> = resolved.iter().map(|s| s.uuid).collect();
        assert_eq!(actual.len(), 7);
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_lookup_timeout() {
        let store = Arc::new(InMemoryEventStore::new());
        let summaries = stored(&store, 2);
        store.set_lookup_delay(Some(Duration::from_millis(200)));

        let keys: Vec<EventKey> = summaries.iter().map(EventKey::from).collect();
        let reconciler = ArchiveReconciler::new("archive", store, Duration::from_millis(20));
        let err = reconciler.resolve(&keys).await.unwrap_err();
        assert!(matches!(err, IndexError::SearchTimeout(_)));
    }

    #[tokio::test]
    async fn test_find_missing_is_none() {
        let store = Arc::new(InMemoryEventStore::new());
        let reconciler = ArchiveReconciler::new("archive", store, Duration::from_secs(1));
        assert!(reconciler.find_by_uuid(&Uuid::new_v4()).await.unwrap().is_none());
    }
}
