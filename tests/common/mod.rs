//! Common test utilities for index testing
//!
//! Builders for events and summaries plus embedded indexes rooted in a
//! temporary directory.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use llm_event_index::index::{
    DocumentShape, EmbeddedBackend, EventIndexBackend, EventIndexDao, IndexConfig,
    IndexConfigBuilder,
};
use llm_event_index::models::{
    Event, EventDetail, EventDetailItem, EventDetailType, EventSeverity, EventSummary,
    IndexedDetails,
};
use llm_event_index::state::{EventSummaryStore, InMemoryEventStore};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// Details indexed by every test index
pub fn test_details() -> IndexedDetails {
    IndexedDetails::new(vec![
        EventDetailItem::new("ip", EventDetailType::IpAddress),
        EventDetailItem::new("location", EventDetailType::Path),
        EventDetailItem::new("priority", EventDetailType::Integer),
    ])
}

pub fn index_config(dir: &TempDir, name: &str) -> IndexConfig {
    IndexConfigBuilder::new()
        .index_path(dir.path().join(name))
        .writer_heap_size(15_000_000)
        .refresh_interval_ms(0)
        .build()
}

pub async fn embedded_backend(
    dir: &TempDir,
    name: &str,
    shape: DocumentShape,
) -> Arc<dyn EventIndexBackend> {
    Arc::new(
        EmbeddedBackend::open(name, shape, index_config(dir, name), &test_details())
            .await
            .expect("index should open"),
    )
}

/// Summary index flushing after every write
pub async fn summary_dao(dir: &TempDir) -> EventIndexDao {
    EventIndexDao::summary(
        embedded_backend(dir, "summary", DocumentShape::Summary).await,
        true,
    )
}

/// Archive index resolving records from `store`
pub async fn archive_dao(dir: &TempDir, store: &InMemoryEventStore) -> EventIndexDao {
    let store: Arc<dyn EventSummaryStore> = Arc::new(store.clone());
    EventIndexDao::archive(
        embedded_backend(dir, "archive", DocumentShape::Archive).await,
        store,
        std::time::Duration::from_secs(2),
        true,
    )
}

pub fn event(summary: &str, severity: EventSeverity) -> Event {
    let mut event = Event::new(summary, severity);
    event.fingerprint = Uuid::new_v4().to_string();
    event
}

/// Summary last seen `minutes_ago` minutes in the past
pub fn summary_seen(summary: &str, severity: EventSeverity, minutes_ago: i64) -> EventSummary {
    let mut event = event(summary, severity);
    event.created_time = Utc::now() - Duration::minutes(minutes_ago);
    EventSummary::new(event)
}

pub fn with_element(mut summary: EventSummary, identifier: &str) -> EventSummary {
    summary.occurrence.actor.element_identifier = identifier.to_string();
    summary
}

pub fn with_event_class(mut summary: EventSummary, event_class: &str) -> EventSummary {
    summary.occurrence.event_class = event_class.to_string();
    summary
}

pub fn with_detail(mut summary: EventSummary, name: &str, value: &str) -> EventSummary {
    summary.occurrence.details.push(EventDetail {
        name: name.to_string(),
        values: vec![value.to_string()],
    });
    summary
}
