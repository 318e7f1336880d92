//! Per-tag severity accumulation shared by both backends

use crate::models::{EventFilter, EventSeverity, EventStatus, EventSummary, TagSeverityMap};

/// Accumulates severity counts per tag or element uuid.
///
/// With a tag filter only the filtered tags are reported, each present even
/// when nothing matched. Without one every element seen gets an entry.
#[derive(Debug, Clone, Default)]
pub struct TagSeverityAccumulator {
    tag_filtered: bool,
    severities: TagSeverityMap,
}

impl TagSeverityAccumulator {
    pub fn new(filter: Option<&EventFilter>) -> Self {
        let mut accumulator = Self::default();
        if let Some(filter) = filter.filter(|f| f.has_tag_filter()) {
            accumulator.tag_filtered = true;
            for uuid in filter.tag_uuids() {
                accumulator.severities.entry(uuid).or_default();
            }
        }
        accumulator
    }

    pub fn is_tag_filtered(&self) -> bool {
        self.tag_filtered
    }

    /// Count one summary under `key`
    pub fn update(&mut self, key: &str, severity: EventSeverity, count: u64, acknowledged: bool) {
        self.update_bucket(key, severity, 1, count, acknowledged);
    }

    /// Count `summaries` summaries whose occurrence counts add up to `total`
    pub fn update_bucket(
        &mut self,
        key: &str,
        severity: EventSeverity,
        summaries: u64,
        total: u64,
        acknowledged: bool,
    ) {
        let entry = match self.severities.get_mut(key) {
            Some(entry) => entry,
            None if !self.tag_filtered => self.severities.entry(key.to_string()).or_default(),
            None => return,
        };
        entry.total += total;
        let counts = entry.severities.entry(severity).or_default();
        counts.count += summaries;
        if acknowledged {
            counts.acknowledged_count += summaries;
        }
    }

    /// Count one summary from its indexed aggregation values.
    ///
    /// `element_uuid` keys the unfiltered aggregation; `tags` holds every tag
    /// value of the document (tag uuids, element and sub-element uuids).
    pub fn update_indexed<'a>(
        &mut self,
        element_uuid: Option<&str>,
        tags: impl IntoIterator<Item = &'a str>,
        severity: EventSeverity,
        count: u64,
        status: EventStatus,
    ) {
        let acknowledged = status == EventStatus::Acknowledged;
        if self.tag_filtered {
            for tag in tags {
                self.update(tag, severity, count, acknowledged);
            }
        } else if let Some(uuid) = element_uuid {
            self.update(uuid, severity, count, acknowledged);
        }
    }

    /// Count one decoded summary
    pub fn update_summary(&mut self, summary: &EventSummary) {
        let severity = summary.severity();
        let count = summary.count as u64;
        let acknowledged = summary.is_acknowledged();
        let actor = &summary.occurrence.actor;

        if !self.tag_filtered {
            if let Some(uuid) = actor.element_uuid {
                self.update(&uuid.to_string(), severity, count, acknowledged);
            }
            return;
        }

        for uuid in [actor.element_uuid, actor.element_sub_uuid].into_iter().flatten() {
            self.update(&uuid.to_string(), severity, count, acknowledged);
        }
        for tag in &summary.occurrence.tags {
            for uuid in &tag.uuids {
                self.update(uuid, severity, count, acknowledged);
            }
        }
    }

    pub fn finish(self) -> TagSeverityMap {
        self.severities
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventTag, FilterOperator};
    use uuid::Uuid;

    fn summary(element: Uuid, tags: Vec<&str>, severity: EventSeverity, count: u32) -> EventSummary {
        let mut event = Event::new("tagged", severity);
        event.actor.element_uuid = Some(element);
        event.tags = vec![EventTag {
            tag_type: "zenoss.device.group".to_string(),
            uuids: tags.into_iter().map(String::from).collect(),
        }];
        let mut summary = EventSummary::new(event);
        summary.count = count;
        summary
    }

    #[test]
    fn test_unfiltered_keys_on_element() {
        let element = Uuid::new_v4();
        let mut acc = TagSeverityAccumulator::new(None);
        acc.update_summary(&summary(element, vec!["group-a"], EventSeverity::Error, 3));
        let mut acked = summary(element, vec![], EventSeverity::Error, 2);
        acked.status = EventStatus::Acknowledged;
        acc.update_summary(&acked);

        let result = acc.finish();
        assert_eq!(result.len(), 1);
        let severities = &result[&element.to_string()];
        assert_eq!(severities.total, 5);
        assert_eq!(severities.count(EventSeverity::Error), 2);
        assert_eq!(severities.acknowledged(EventSeverity::Error), 1);
    }

    #[test]
    fn test_filtered_reports_only_filter_tags() {
        let filter = EventFilter::new().with_tags(
            FilterOperator::Or,
            vec!["group-a".to_string(), "group-b".to_string()],
        );
        let mut acc = TagSeverityAccumulator::new(Some(&filter));
        assert!(acc.is_tag_filtered());
        acc.update_summary(&summary(
            Uuid::new_v4(),
            vec!["group-a", "group-c"],
            EventSeverity::Critical,
            4,
        ));

        let result = acc.finish();
        assert_eq!(result.len(), 2);
        assert_eq!(result["group-a"].total, 4);
        assert_eq!(result["group-a"].count(EventSeverity::Critical), 1);
        // Pre-seeded even though nothing matched
        assert_eq!(result["group-b"].total, 0);
        assert!(!result.contains_key("group-c"));
    }

    #[test]
    fn test_indexed_and_decoded_paths_agree() {
        let element = Uuid::new_v4();
        let filter = EventFilter::new().with_tags(FilterOperator::Or, vec![element.to_string()]);
        let record = summary(element, vec!["group-a"], EventSeverity::Warning, 7);

        let mut decoded = TagSeverityAccumulator::new(Some(&filter));
        decoded.update_summary(&record);

        let mut indexed = TagSeverityAccumulator::new(Some(&filter));
        let element_str = element.to_string();
        indexed.update_indexed(
            Some(element_str.as_str()),
            ["group-a", element_str.as_str()],
            EventSeverity::Warning,
            7,
            EventStatus::New,
        );

        assert_eq!(decoded.finish(), indexed.finish());
    }
}
