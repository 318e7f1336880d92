use crate::error::{IndexError, Result};
use crate::models::event::{EventSeverity, EventStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the values of a filter (or the filters of a group) combine
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, EnumString, Display,
)]
#[strum(ascii_case_insensitive)]
pub enum FilterOperator {
    #[default]
    And,
    Or,
}

/// Inclusive time window; either end may be open
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TimestampRange {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl TimestampRange {
    pub fn new(start_time: Option<DateTime<Utc>>, end_time: Option<DateTime<Utc>>) -> Self {
        Self {
            start_time,
            end_time,
        }
    }
}

/// Inclusive integer window; either end may be open
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct NumberRange {
    pub from: Option<i64>,
    pub to: Option<i64>,
}

/// Matches events carrying any (OR) or all (AND) of the given tag uuids
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventTagFilter {
    pub tag_uuids: Vec<String>,
    #[serde(default)]
    pub op: FilterOperator,
}

/// Matches the values of one configured detail
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EventDetailFilter {
    pub key: String,
    pub values: Vec<String>,
    #[serde(default)]
    pub op: FilterOperator,
}

/// Structured event filter.
///
/// Every list is OR-ed internally; populated fields are combined with
/// `operator`. Sub-filters carry their own operator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventFilter {
    pub severity: Vec<EventSeverity>,
    pub status: Vec<EventStatus>,
    pub event_class: Vec<String>,
    pub first_seen: Vec<TimestampRange>,
    pub last_seen: Vec<TimestampRange>,
    pub status_change: Vec<TimestampRange>,
    pub update_time: Vec<TimestampRange>,
    pub count_range: Vec<NumberRange>,
    pub element_identifier: Vec<String>,
    pub element_title: Vec<String>,
    pub element_sub_identifier: Vec<String>,
    pub element_sub_title: Vec<String>,
    pub uuid: Vec<String>,
    pub event_summary: Vec<String>,
    pub current_user_name: Vec<String>,
    pub event_key: Vec<String>,
    pub event_class_key: Vec<String>,
    pub event_group: Vec<String>,
    pub message: Vec<String>,
    pub agent: Vec<String>,
    pub monitor: Vec<String>,
    pub fingerprint: Vec<String>,
    pub tag_filter: Vec<EventTagFilter>,
    pub details: Vec<EventDetailFilter>,
    pub subfilter: Vec<EventFilter>,
    pub operator: FilterOperator,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_operator(mut self, operator: FilterOperator) -> Self {
        self.operator = operator;
        self
    }

    pub fn with_severity(mut self, severities: impl IntoIterator<Item = EventSeverity>) -> Self {
        self.severity.extend(severities);
        self
    }

    pub fn with_status(mut self, statuses: impl IntoIterator<Item = EventStatus>) -> Self {
        self.status.extend(statuses);
        self
    }

    pub fn with_event_class(mut self, value: impl Into<String>) -> Self {
        self.event_class.push(value.into());
        self
    }

    pub fn with_element_identifier(mut self, value: impl Into<String>) -> Self {
        self.element_identifier.push(value.into());
        self
    }

    pub fn with_element_title(mut self, value: impl Into<String>) -> Self {
        self.element_title.push(value.into());
        self
    }

    pub fn with_summary(mut self, value: impl Into<String>) -> Self {
        self.event_summary.push(value.into());
        self
    }

    pub fn with_element_sub_identifier(mut self, value: impl Into<String>) -> Self {
        self.element_sub_identifier.push(value.into());
        self
    }

    pub fn with_message(mut self, value: impl Into<String>) -> Self {
        self.message.push(value.into());
        self
    }

    pub fn with_uuid(mut self, value: impl Into<String>) -> Self {
        self.uuid.push(value.into());
        self
    }

    pub fn with_count_range(mut self, from: Option<i64>, to: Option<i64>) -> Self {
        self.count_range.push(NumberRange { from, to });
        self
    }

    pub fn with_first_seen(mut self, range: TimestampRange) -> Self {
        self.first_seen.push(range);
        self
    }

    pub fn with_last_seen(mut self, range: TimestampRange) -> Self {
        self.last_seen.push(range);
        self
    }

    pub fn with_tags(mut self, op: FilterOperator, tag_uuids: Vec<String>) -> Self {
        self.tag_filter.push(EventTagFilter { tag_uuids, op });
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.details.push(EventDetailFilter {
            key: key.into(),
            values,
            op: FilterOperator::Or,
        });
        self
    }

    pub fn with_subfilter(mut self, filter: EventFilter) -> Self {
        self.subfilter.push(filter);
        self
    }

    /// Whether any tag constraint is present
    pub fn has_tag_filter(&self) -> bool {
        self.tag_filter.iter().any(|t| !t.tag_uuids.is_empty())
    }

    /// All tag uuids named by the tag filters, in order of appearance
    pub fn tag_uuids(&self) -> Vec<String> {
        let mut uuids = Vec::new();
        for tag_filter in &self.tag_filter {
            for uuid in &tag_filter.tag_uuids {
                if !uuids.contains(uuid) {
                    uuids.push(uuid.clone());
                }
            }
        }
        uuids
    }
}

/// Sortable summary fields
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SortField {
    Uuid,
    EventSummary,
    Severity,
    Status,
    Count,
    FirstSeen,
    LastSeen,
    StatusChange,
    UpdateTime,
    CurrentUserName,
    ElementIdentifier,
    ElementTitle,
    ElementSubIdentifier,
    ElementSubTitle,
    EventClass,
    EventClassKey,
    EventKey,
    EventGroup,
    Agent,
    Monitor,
    Fingerprint,
    Detail,
}

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display,
)]
#[strum(ascii_case_insensitive)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// One sort key of a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSort {
    pub field: SortField,
    #[serde(default)]
    pub direction: SortDirection,
    /// Detail key, required when `field` is `Detail`
    #[serde(default)]
    pub detail_key: Option<String>,
}

impl EventSort {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self {
            field,
            direction,
            detail_key: None,
        }
    }

    pub fn detail(key: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: SortField::Detail,
            direction,
            detail_key: Some(key.into()),
        }
    }

    /// Parse a sort from a field name such as `last_seen`
    pub fn parse(field: &str, direction: SortDirection) -> Result<Self> {
        let field = field
            .parse::<SortField>()
            .map_err(|_| IndexError::UnsupportedSortField(field.to_string()))?;
        Ok(Self::new(field, direction))
    }

    pub fn is_descending(&self) -> bool {
        self.direction == SortDirection::Descending
    }
}

/// A paged list request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventSummaryRequest {
    #[serde(default)]
    pub filter: Option<EventFilter>,
    #[serde(default)]
    pub exclusion: Option<EventFilter>,
    #[serde(default)]
    pub sort: Vec<EventSort>,
    #[serde(default)]
    pub offset: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    1000
}

impl Default for EventSummaryRequest {
    fn default() -> Self {
        Self {
            filter: None,
            exclusion: None,
            sort: Vec::new(),
            offset: 0,
            limit: default_limit(),
        }
    }
}

impl EventSummaryRequest {
    pub fn new(filter: Option<EventFilter>) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    pub fn with_exclusion(mut self, exclusion: EventFilter) -> Self {
        self.exclusion = Some(exclusion);
        self
    }

    pub fn with_sort(mut self, sort: EventSort) -> Self {
        self.sort.push(sort);
        self
    }

    pub fn with_page(mut self, offset: i64, limit: i64) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }
}

/// Parameters of a saved search
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventQuery {
    #[serde(default)]
    pub filter: Option<EventFilter>,
    #[serde(default)]
    pub exclusion: Option<EventFilter>,
    #[serde(default)]
    pub sort: Vec<EventSort>,
    /// Idle timeout in seconds, at least one
    pub timeout_secs: i64,
}

impl EventQuery {
    pub fn new(filter: Option<EventFilter>, timeout_secs: i64) -> Self {
        Self {
            filter,
            exclusion: None,
            sort: Vec::new(),
            timeout_secs,
        }
    }

    pub fn with_sort(mut self, sort: EventSort) -> Self {
        self.sort.push(sort);
        self
    }
}
