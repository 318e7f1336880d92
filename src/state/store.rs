use crate::error::Result;
use crate::models::{Event, EventStatus, EventSummary};
use crate::state::EventSummaryStore;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// In-memory summary store (for embedding and testing)
#[derive(Clone)]
pub struct InMemoryEventStore {
    summaries: Arc<DashMap<Uuid, EventSummary>>,
    fingerprint_index: Arc<DashMap<String, Uuid>>,
    lookup_delay: Arc<RwLock<Option<Duration>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            summaries: Arc::new(DashMap::new()),
            fingerprint_index: Arc::new(DashMap::new()),
            lookup_delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Delay every lookup, simulating a slow relational store
    pub fn set_lookup_delay(&self, delay: Option<Duration>) {
        *self.lookup_delay.write() = delay;
    }

    /// Fold an occurrence into the open summary sharing its fingerprint,
    /// or start a new summary.
    pub fn record_occurrence(&self, event: Event) -> EventSummary {
        let fingerprint = event.effective_fingerprint();
        let open = self
            .fingerprint_index
            .get(&fingerprint)
            .map(|entry| *entry.value());

        if let Some(uuid) = open {
            if let Some(mut summary) = self.summaries.get_mut(&uuid) {
                if !summary.status.is_archived() {
                    summary.merge_occurrence(event, Utc::now());
                    tracing::debug!(summary_uuid = %uuid, count = summary.count, "Occurrence merged");
                    return summary.clone();
                }
            }
        }

        let mut event = event;
        event.fingerprint = fingerprint.clone();
        let summary = EventSummary::new(event);
        self.fingerprint_index.insert(fingerprint, summary.uuid);
        self.summaries.insert(summary.uuid, summary.clone());
        tracing::debug!(summary_uuid = %summary.uuid, "Summary created");
        summary
    }

    /// Insert or replace a summary as-is
    pub fn save(&self, summary: &EventSummary) {
        if !summary.status.is_archived() {
            self.fingerprint_index
                .insert(summary.occurrence.fingerprint.clone(), summary.uuid);
        }
        self.summaries.insert(summary.uuid, summary.clone());
    }

    /// Change the status of a stored summary
    pub fn update_status(&self, uuid: &Uuid, status: EventStatus) -> Option<EventSummary> {
        let mut summary = self.summaries.get_mut(uuid)?;
        summary.update_status(status, None, Utc::now());
        if status.is_archived() {
            self.fingerprint_index
                .remove_if(&summary.occurrence.fingerprint, |_, open| open == uuid);
        }
        Some(summary.clone())
    }

    pub fn remove(&self, uuid: &Uuid) -> Option<EventSummary> {
        let (_, summary) = self.summaries.remove(uuid)?;
        self.fingerprint_index
            .remove_if(&summary.occurrence.fingerprint, |_, open| open == uuid);
        tracing::debug!(summary_uuid = %uuid, "Summary removed");
        Some(summary)
    }

    pub fn len(&self) -> usize {
        self.summaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    async fn delay(&self) {
        let delay = *self.lookup_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSummaryStore for InMemoryEventStore {
    async fn find_by_uuid(&self, uuid: &Uuid) -> Result<Option<EventSummary>> {
        self.delay().await;
        Ok(self.summaries.get(uuid).map(|entry| entry.clone()))
    }

    async fn find_by_uuids(&self, uuids: &[Uuid]) -> Result<Vec<EventSummary>> {
        self.delay().await;
        let wanted: HashSet<&Uuid> = uuids.iter().collect();
        // Map iteration order, not request order
        Ok(self
            .summaries
            .iter()
            .filter(|entry| wanted.contains(entry.key()))
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventSeverity;

    fn event(identifier: &str) -> Event {
        let mut event = Event::new("Threshold exceeded", EventSeverity::Error);
        event.actor.element_identifier = identifier.to_string();
        event
    }

    #[tokio::test]
    async fn test_fingerprint_dedup() {
        let store = InMemoryEventStore::new();
        let first = store.record_occurrence(event("web01"));
        let second = store.record_occurrence(event("web01"));
        let other = store.record_occurrence(event("web02"));

        assert_eq!(first.uuid, second.uuid);
        assert_eq!(second.count, 2);
        assert_ne!(first.uuid, other.uuid);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_closed_summary_starts_new() {
        let store = InMemoryEventStore::new();
        let first = store.record_occurrence(event("web01"));
        store.update_status(&first.uuid, EventStatus::Closed);

        let next = store.record_occurrence(event("web01"));
        assert_ne!(first.uuid, next.uuid);
        assert_eq!(next.count, 1);
    }

    #[tokio::test]
    async fn test_find_by_uuids_skips_missing() {
        let store = InMemoryEventStore::new();
        let a = store.record_occurrence(event("a"));
        let b = store.record_occurrence(event("b"));

        let found = store
            .find_by_uuids(&[a.uuid, Uuid::new_v4(), b.uuid])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert!(store.find_by_uuid(&a.uuid).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lookup_delay() {
        let store = InMemoryEventStore::new();
        store.set_lookup_delay(Some(Duration::from_millis(50)));
        let started = std::time::Instant::now();
        store.find_by_uuid(&Uuid::new_v4()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(50));
    }
}
