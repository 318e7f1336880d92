use crate::models::event::{EventSeverity, EventSummary};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One page of search results
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    /// Total number of matches in the index
    pub total: u64,

    /// Effective page size after clamping
    pub limit: usize,

    /// Offset of the following page, present iff more matches exist
    pub next_offset: Option<usize>,

    pub events: Vec<T>,
}

impl<T> Page<T> {
    pub fn empty(limit: usize) -> Self {
        Self {
            total: 0,
            limit,
            next_offset: None,
            events: Vec::new(),
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            total: self.total,
            limit: self.limit,
            next_offset: self.next_offset,
            events: self.events.into_iter().map(f).collect(),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            total: self.total,
            limit: self.limit,
            next_offset: self.next_offset,
            events: self.events.into_iter().map(f).collect::<Result<Vec<_>, E>>()?,
        })
    }
}

/// Identity fields of an indexed summary
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub uuid: Uuid,
    pub last_seen_time: DateTime<Utc>,
}

impl From<&EventSummary> for EventKey {
    fn from(summary: &EventSummary) -> Self {
        Self {
            uuid: summary.uuid,
            last_seen_time: summary.last_seen_time,
        }
    }
}

/// Event and acknowledged counts for one severity
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityCounts {
    pub count: u64,
    pub acknowledged_count: u64,
}

/// Per-severity counts for one tag or element
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagSeverities {
    /// Sum of summary occurrence counts
    pub total: u64,
    pub severities: BTreeMap<EventSeverity, SeverityCounts>,
}

impl TagSeverities {
    pub fn count(&self, severity: EventSeverity) -> u64 {
        self.severities.get(&severity).map(|c| c.count).unwrap_or(0)
    }

    pub fn acknowledged(&self, severity: EventSeverity) -> u64 {
        self.severities
            .get(&severity)
            .map(|c| c.acknowledged_count)
            .unwrap_or(0)
    }
}

/// Aggregation keyed by tag uuid or element uuid
pub type TagSeverityMap = BTreeMap<String, TagSeverities>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_map_keeps_paging() {
        let page = Page {
            total: 10,
            limit: 2,
            next_offset: Some(2),
            events: vec![1, 2],
        };
        let mapped = page.map(|n| n * 10);
        assert_eq!(mapped.events, vec![10, 20]);
        assert_eq!(mapped.next_offset, Some(2));
        assert_eq!(mapped.total, 10);
    }

    #[test]
    fn test_tag_severities_defaults() {
        let severities = TagSeverities::default();
        assert_eq!(severities.count(EventSeverity::Critical), 0);
        assert_eq!(severities.acknowledged(EventSeverity::Critical), 0);
    }
}
