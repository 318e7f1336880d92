//! Backend-neutral projection of summaries into indexed values

use crate::index::constants::{NUMERIC_DETAIL_SENTINEL, STRING_DETAIL_SENTINEL};
use crate::index::ip;
use crate::models::{EventDetailItem, EventDetailType, EventSummary, IndexedDetails};
use std::net::IpAddr;
use tracing::warn;

/// Which fields a document carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    /// Serialized record plus every indexed field
    Summary,
    /// Indexed fields only; the record lives in the relational store
    Archive,
}

impl DocumentShape {
    pub fn stores_record(&self) -> bool {
        matches!(self, DocumentShape::Summary)
    }

    pub fn label(&self) -> &'static str {
        match self {
            DocumentShape::Summary => "summary",
            DocumentShape::Archive => "archive",
        }
    }
}

/// A typed detail value ready for indexing
#[derive(Debug, Clone, PartialEq)]
pub enum DetailValue {
    /// Raw term; also the encoding of the missing-detail sentinel
    Text(String),
    Long(i64),
    Double(f64),
    Address(IpAddr),
    Path(String),
}

/// Typed values of every configured detail for one summary.
///
/// A detail the event does not carry yields its sentinel so "missing" can
/// be searched for; values that fail to parse are skipped with a warning.
pub fn indexed_detail_values<'a>(
    summary: &EventSummary,
    details: &'a IndexedDetails,
) -> Vec<(&'a EventDetailItem, Vec<DetailValue>)> {
    details
        .iter()
        .map(|item| {
            let values = match summary.occurrence.detail_values(&item.key) {
                None => vec![sentinel(item.detail_type)],
                Some(raw) => raw
                    .iter()
                    .filter_map(|value| parse_detail_value(summary, item, value))
                    .collect(),
            };
            (item, values)
        })
        .collect()
}

fn sentinel(detail_type: EventDetailType) -> DetailValue {
    match detail_type {
        EventDetailType::Integer | EventDetailType::Long => DetailValue::Long(NUMERIC_DETAIL_SENTINEL),
        EventDetailType::Float | EventDetailType::Double => {
            DetailValue::Double(NUMERIC_DETAIL_SENTINEL as f64)
        }
        _ => DetailValue::Text(STRING_DETAIL_SENTINEL.to_string()),
    }
}

fn parse_detail_value(
    summary: &EventSummary,
    item: &EventDetailItem,
    value: &str,
) -> Option<DetailValue> {
    let parsed = match item.detail_type {
        EventDetailType::String => Some(DetailValue::Text(value.to_string())),
        EventDetailType::Integer => value
            .trim()
            .parse::<i32>()
            .ok()
            .map(|v| DetailValue::Long(v as i64)),
        EventDetailType::Long => value.trim().parse::<i64>().ok().map(DetailValue::Long),
        EventDetailType::Float => value
            .trim()
            .parse::<f32>()
            .ok()
            .map(|v| DetailValue::Double(v as f64)),
        EventDetailType::Double => value.trim().parse::<f64>().ok().map(DetailValue::Double),
        EventDetailType::IpAddress => {
            if value.is_empty() {
                return None;
            }
            ip::parse_address(value).ok().map(DetailValue::Address)
        }
        EventDetailType::Path => Some(DetailValue::Path(value.to_string())),
    };

    if parsed.is_none() {
        warn!(
            summary_uuid = %summary.uuid,
            detail = %item.key,
            detail_type = %item.detail_type,
            value = %value,
            "Invalid detail value, skipping"
        );
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventDetail, EventSeverity};

    fn summary_with(details: Vec<(&str, Vec<&str>)>) -> EventSummary {
        let mut event = Event::new("cpu high", EventSeverity::Warning);
        event.details = details
            .into_iter()
            .map(|(name, values)| EventDetail {
                name: name.to_string(),
                values: values.into_iter().map(str::to_string).collect(),
            })
            .collect();
        EventSummary::new(event)
    }

    fn config() -> IndexedDetails {
        IndexedDetails::new(vec![
            EventDetailItem::new("prio", EventDetailType::Integer),
            EventDetailItem::new("ip", EventDetailType::IpAddress),
            EventDetailItem::new("loc", EventDetailType::Path),
            EventDetailItem::new("load", EventDetailType::Float),
        ])
    }

    #[test]
    fn test_missing_details_get_sentinels() {
        let details = config();
        let values = indexed_detail_values(&summary_with(vec![]), &details);
        let by_key: Vec<(&str, &Vec<DetailValue>)> =
            values.iter().map(|(i, v)| (i.key.as_str(), v)).collect();

        assert!(by_key.contains(&("prio", &vec![DetailValue::Long(i32::MIN as i64)])));
        assert!(by_key.contains(&("load", &vec![DetailValue::Double(i32::MIN as f64)])));
        assert!(by_key.contains(&("ip", &vec![DetailValue::Text("\u{07}".into())])));
    }

    #[test]
    fn test_invalid_values_skipped() {
        let details = config();
        let summary = summary_with(vec![
            ("prio", vec!["3", "high", "99999999999"]),
            ("ip", vec!["10.0.0.1", "", "not-an-ip"]),
        ]);
        let values = indexed_detail_values(&summary, &details);
        for (item, values) in values {
            match item.key.as_str() {
                "prio" => assert_eq!(values, vec![DetailValue::Long(3)]),
                "ip" => assert_eq!(values.len(), 1),
                _ => {}
            }
        }
    }
}
