//! Embedded index DAO integration tests

mod common;

use chrono::{Duration, Utc};
use common::*;
use llm_event_index::models::{
    EventFilter, EventSeverity, EventSort, EventStatus, EventSummary, EventSummaryRequest,
    FilterOperator, SortDirection, SortField,
};
use llm_event_index::state::InMemoryEventStore;
use llm_event_index::IndexError;
use std::collections::HashSet;
use tempfile::TempDir;
use uuid::Uuid;

fn request(filter: EventFilter) -> EventSummaryRequest {
    EventSummaryRequest::new(Some(filter))
}

fn uuids(events: &[EventSummary]) -> Vec<Uuid> {
    events.iter().map(|s| s.uuid).collect()
}

#[tokio::test]
async fn test_element_identifier_search() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    let target = with_element(
        summary_seen("JBoss down", EventSeverity::Error, 1),
        "test-jboss.zenoss.loc",
    );
    let other = with_element(summary_seen("Other", EventSeverity::Error, 1), "router-7");
    dao.index_many(&[target.clone(), other]).await.unwrap();

    for value in ["tes*", "\"TEST-jBoss.Zenoss.lOc\"", "noss", "jboss"] {
        let page = dao
            .list(&request(EventFilter::new().with_element_identifier(value)))
            .await
            .unwrap();
        assert_eq!(uuids(&page.events), vec![target.uuid], "{}", value);
    }

    let page = dao
        .list(&request(EventFilter::new().with_element_identifier("\"test-jboss\"")))
        .await
        .unwrap();
    assert!(page.events.is_empty());
}

#[tokio::test]
async fn test_event_class_path_search() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    let ping = with_event_class(summary_seen("ping", EventSeverity::Warning, 1), "/Status/Ping");
    let snmp = with_event_class(summary_seen("snmp", EventSeverity::Warning, 2), "/Status/Snmp");
    dao.index_many(&[ping.clone(), snmp]).await.unwrap();

    let cases = [("/Status", 0), ("/Status/", 2), ("/Status*", 2), ("/Status/Ping", 1)];
    for (value, expected) in cases {
        let page = dao
            .list(&request(EventFilter::new().with_event_class(value)))
            .await
            .unwrap();
        assert_eq!(page.total, expected, "{}", value);
    }

    let page = dao
        .list(&request(EventFilter::new().with_event_class("/status/ping")))
        .await
        .unwrap();
    assert_eq!(uuids(&page.events), vec![ping.uuid]);
}

#[tokio::test]
async fn test_ip_detail_sort_orders_v4_before_v6() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    let addresses = ["192f::", "192.168.1.2", "::", "0.0.0.0"];
    let summaries: Vec<EventSummary> = addresses
        .iter()
        .map(|ip| with_detail(summary_seen(ip, EventSeverity::Info, 1), "ip", ip))
        .collect();
    dao.index_many(&summaries).await.unwrap();

    let page = dao
        .list(&EventSummaryRequest::default().with_sort(EventSort::detail("ip", SortDirection::Ascending)))
        .await
        .unwrap();
    let order: Vec<&str> = page
        .events
        .iter()
        .map(|s| s.occurrence.summary.as_str())
        .collect();
    assert_eq!(order, vec!["0.0.0.0", "192.168.1.2", "::", "192f::"]);
}

#[tokio::test]
async fn test_default_sort_is_last_seen_descending() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    let oldest = summary_seen("oldest", EventSeverity::Info, 30);
    let newest = summary_seen("newest", EventSeverity::Info, 1);
    let middle = summary_seen("middle", EventSeverity::Info, 10);
    dao.index_many(&[oldest.clone(), newest.clone(), middle.clone()])
        .await
        .unwrap();

    let page = dao.list(&EventSummaryRequest::default()).await.unwrap();
    assert_eq!(uuids(&page.events), vec![newest.uuid, middle.uuid, oldest.uuid]);

    let page = dao
        .list(&EventSummaryRequest::default().with_sort(EventSort::new(SortField::LastSeen, SortDirection::Ascending)))
        .await
        .unwrap();
    assert_eq!(uuids(&page.events), vec![oldest.uuid, middle.uuid, newest.uuid]);
}

#[tokio::test]
async fn test_pagination() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    let summaries: Vec<EventSummary> = (0..5)
        .map(|i| summary_seen(&format!("event {}", i), EventSeverity::Info, i))
        .collect();
    dao.index_many(&summaries).await.unwrap();

    let first = dao
        .list(&EventSummaryRequest::default().with_page(0, 2))
        .await
        .unwrap();
    assert_eq!(first.total, 5);
    assert_eq!(first.events.len(), 2);
    assert_eq!(first.next_offset, Some(2));

    let last = dao
        .list(&EventSummaryRequest::default().with_page(4, 2))
        .await
        .unwrap();
    assert_eq!(last.events.len(), 1);
    assert_eq!(last.next_offset, None);

    let empty = dao
        .list(&EventSummaryRequest::default().with_page(0, 0))
        .await
        .unwrap();
    assert_eq!(empty.total, 5);
    assert!(empty.events.is_empty());
    assert_eq!(empty.next_offset, Some(0));

    let err = dao
        .list(&EventSummaryRequest::default().with_page(0, -1))
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::InvalidLimit(-1)));
}

#[tokio::test]
async fn test_exclusion_filter() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    let open = summary_seen("open", EventSeverity::Critical, 1);
    let mut closed = summary_seen("closed", EventSeverity::Critical, 2);
    closed.status = EventStatus::Closed;
    dao.index_many(&[open.clone(), closed]).await.unwrap();

    let page = dao
        .list(
            &EventSummaryRequest::new(Some(EventFilter::new().with_severity([EventSeverity::Critical])))
                .with_exclusion(EventFilter::new().with_status([EventStatus::Closed])),
        )
        .await
        .unwrap();
    assert_eq!(uuids(&page.events), vec![open.uuid]);
}

#[tokio::test]
async fn test_purge_removes_old_summaries() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    let old = summary_seen("old", EventSeverity::Info, 120);
    let recent = summary_seen("recent", EventSeverity::Info, 1);
    dao.index_many(&[old.clone(), recent.clone()]).await.unwrap();

    dao.purge(Utc::now() - Duration::minutes(60)).await.unwrap();

    assert_eq!(dao.count().await.unwrap(), 1);
    assert!(dao.find_by_uuid(&old.uuid).await.unwrap().is_none());
    assert_eq!(dao.find_by_uuid(&recent.uuid).await.unwrap(), Some(recent));
}

#[tokio::test]
async fn test_list_uuids_returns_keys() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    let summary = summary_seen("keyed", EventSeverity::Info, 5);
    dao.index(&summary).await.unwrap();

    let page = dao.list_uuids(&EventSummaryRequest::default()).await.unwrap();
    assert_eq!(page.events.len(), 1);
    assert_eq!(page.events[0].uuid, summary.uuid);
    assert_eq!(
        page.events[0].last_seen_time.timestamp_millis(),
        summary.last_seen_time.timestamp_millis()
    );
}

#[tokio::test]
async fn test_tag_severities() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    let element = Uuid::new_v4();

    let mut critical = summary_seen("critical", EventSeverity::Critical, 1);
    critical.occurrence.actor.element_uuid = Some(element);
    critical.count = 3;
    let mut acked = summary_seen("acked", EventSeverity::Critical, 2);
    acked.occurrence.actor.element_uuid = Some(element);
    acked.status = EventStatus::Acknowledged;
    let mut tagged = summary_seen("tagged", EventSeverity::Warning, 3);
    tagged.occurrence.tags = vec![llm_event_index::models::EventTag {
        tag_type: "zenoss.device.group".to_string(),
        uuids: vec!["group-a".to_string()],
    }];
    dao.index_many(&[critical, acked, tagged]).await.unwrap();

    let all = dao.get_event_tag_severities(None).await.unwrap();
    let counts = &all[&element.to_string()];
    assert_eq!(counts.total, 4);
    assert_eq!(counts.count(EventSeverity::Critical), 2);
    assert_eq!(counts.acknowledged(EventSeverity::Critical), 1);
    assert!(!all.contains_key("group-a"));

    let filter = EventFilter::new().with_tags(
        FilterOperator::Or,
        vec!["group-a".to_string(), "group-b".to_string()],
    );
    let tagged = dao.get_event_tag_severities(Some(&filter)).await.unwrap();
    assert_eq!(tagged.len(), 2);
    assert_eq!(tagged["group-a"].count(EventSeverity::Warning), 1);
    assert_eq!(tagged["group-b"].total, 0);
}

#[tokio::test]
async fn test_archive_reads_resolve_through_store() {
    let dir = TempDir::new().unwrap();
    let store = InMemoryEventStore::new();
    let dao = archive_dao(&dir, &store).await;

    let mut archived = Vec::new();
    for minutes in [5, 15, 10] {
        let mut summary = summary_seen(&format!("archived {}", minutes), EventSeverity::Info, minutes);
        summary.status = EventStatus::Closed;
        store.save(&summary);
        archived.push(summary);
    }
    dao.index_many(&archived).await.unwrap();

    let page = dao.list(&EventSummaryRequest::default()).await.unwrap();
    assert_eq!(
        uuids(&page.events),
        vec![archived[0].uuid, archived[2].uuid, archived[1].uuid]
    );

    // Rows gone from the store are skipped; the total still counts them
    store.remove(&archived[2].uuid);
    let page = dao.list(&EventSummaryRequest::default()).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(uuids(&page.events), vec![archived[0].uuid, archived[1].uuid]);

    let found = dao.find_by_uuid(&archived[1].uuid).await.unwrap();
    assert_eq!(found, Some(archived[1].clone()));
    assert!(dao.find_by_uuid(&archived[2].uuid).await.unwrap().is_none());
}

#[tokio::test]
async fn test_clear_and_stats() {
    let dir = TempDir::new().unwrap();
    let dao = summary_dao(&dir).await;
    assert!(dao.is_ready());
    assert!(dao.ping().await);

    let summaries: Vec<EventSummary> = (0..3)
        .map(|i| summary_seen(&format!("event {}", i), EventSeverity::Debug, i))
        .collect();
    dao.index_many(&summaries).await.unwrap();
    assert_eq!(dao.count().await.unwrap(), 3);
    assert!(dao.size_in_bytes().await > 0);

    let remove: Vec<Uuid> = summaries.iter().take(2).map(|s| s.uuid).collect();
    dao.delete_many(&remove).await.unwrap();
    assert_eq!(dao.count().await.unwrap(), 1);

    dao.clear().await.unwrap();
    assert_eq!(dao.count().await.unwrap(), 0);

    let remaining: HashSet<Uuid> = uuids(&dao.list(&EventSummaryRequest::default()).await.unwrap().events)
        .into_iter()
        .collect();
    assert!(remaining.is_empty());
    dao.close().await.unwrap();
}
