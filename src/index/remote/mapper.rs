//! Summary ↔ remote JSON document mapping

use crate::error::{IndexError, Result};
use crate::index::constants::*;
use crate::index::document::{indexed_detail_values, DetailValue, DocumentShape};
use crate::index::ip;
use crate::index::remote::clauses::remote_detail_field;
use crate::models::{from_millis, to_millis, EventKey, EventSummary, IndexedDetails};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Append to a multi-valued field
fn push(doc: &mut Map<String, Value>, field: &str, value: Value) {
    match doc.get_mut(field) {
        Some(Value::Array(values)) => values.push(value),
        _ => {
            doc.insert(field.to_string(), Value::Array(vec![value]));
        }
    }
}

/// Build the remote document of one summary
pub fn to_remote_doc(
    summary: &EventSummary,
    shape: DocumentShape,
    details: &IndexedDetails,
) -> Result<Value> {
    let event = &summary.occurrence;
    let actor = &event.actor;
    let mut doc = Map::new();

    if shape.stores_record() {
        doc.insert(FIELD_RECORD.into(), json!(serde_json::to_string(summary)?));
    }

    doc.insert(FIELD_UUID.into(), json!(summary.uuid.to_string()));
    doc.insert(
        FIELD_CURRENT_USER_NAME.into(),
        json!(summary.current_user_name.as_deref().unwrap_or_default()),
    );
    doc.insert(FIELD_STATUS.into(), json!(summary.status.ordinal()));
    doc.insert(FIELD_SEVERITY.into(), json!(event.severity.ordinal()));
    doc.insert(FIELD_COUNT.into(), json!(summary.count));
    doc.insert(FIELD_LAST_SEEN_TIME.into(), json!(to_millis(&summary.last_seen_time)));
    doc.insert(FIELD_FIRST_SEEN_TIME.into(), json!(to_millis(&summary.first_seen_time)));
    doc.insert(
        FIELD_STATUS_CHANGE_TIME.into(),
        json!(to_millis(&summary.status_change_time)),
    );
    doc.insert(FIELD_UPDATE_TIME.into(), json!(to_millis(&summary.update_time)));

    doc.insert(FIELD_FINGERPRINT.into(), json!(event.fingerprint));
    doc.insert(FIELD_SUMMARY.into(), json!(event.summary));
    doc.insert(FIELD_SUMMARY_NOT_ANALYZED.into(), json!(event.summary.to_lowercase()));
    doc.insert(FIELD_EVENT_CLASS.into(), json!(event.event_class));
    doc.insert(
        FIELD_EVENT_CLASS_NOT_ANALYZED.into(),
        json!(format!("{}/", event.event_class.to_lowercase())),
    );
    doc.insert(FIELD_AGENT.into(), json!(event.agent));
    doc.insert(FIELD_MONITOR.into(), json!(event.monitor));
    doc.insert(FIELD_EVENT_KEY.into(), json!(event.event_key));
    doc.insert(FIELD_EVENT_CLASS_KEY.into(), json!(event.event_class_key));
    doc.insert(FIELD_EVENT_GROUP.into(), json!(event.event_group));
    doc.insert(FIELD_MESSAGE.into(), json!(event.message));

    for tag in &event.tags {
        for uuid in &tag.uuids {
            push(&mut doc, FIELD_TAGS, json!(uuid));
        }
    }
    if let Some(uuid) = actor.element_uuid {
        push(&mut doc, FIELD_TAGS, json!(uuid.to_string()));
        doc.insert(FIELD_ELEMENT_UUID.into(), json!(uuid.to_string()));
    }
    if let Some(uuid) = actor.element_sub_uuid {
        push(&mut doc, FIELD_TAGS, json!(uuid.to_string()));
        doc.insert(FIELD_ELEMENT_SUB_UUID.into(), json!(uuid.to_string()));
    }

    for (field, value) in [
        (FIELD_ELEMENT_IDENTIFIER, &actor.element_identifier),
        (FIELD_ELEMENT_TITLE, &actor.element_title),
        (FIELD_ELEMENT_SUB_IDENTIFIER, &actor.element_sub_identifier),
        (FIELD_ELEMENT_SUB_TITLE, &actor.element_sub_title),
    ] {
        doc.insert(field.into(), json!(value));
        doc.insert(non_analyzed_field(field), json!(value.to_lowercase()));
    }

    for (item, values) in indexed_detail_values(summary, details) {
        let field = remote_detail_field(item);
        for value in values {
            match value {
                DetailValue::Text(text) => push(&mut doc, &field, json!(text)),
                DetailValue::Long(v) => push(&mut doc, &field, json!(v)),
                DetailValue::Double(v) => push(&mut doc, &field, json!(v)),
                DetailValue::Address(addr) => {
                    let ip_type = if ip::is_ipv6(&addr) {
                        IP_ADDRESS_TYPE_6
                    } else {
                        IP_ADDRESS_TYPE_4
                    };
                    push(&mut doc, &field, json!(ip::host_address(&addr)));
                    push(&mut doc, &format!("{}{}", field, IP_ADDRESS_TYPE_SUFFIX), json!(ip_type));
                    push(
                        &mut doc,
                        &format!("{}{}", field, SORT_SUFFIX),
                        json!(ip::canonical_ip_address(&addr)),
                    );
                }
                DetailValue::Path(path) => {
                    let lower = path.to_lowercase();
                    push(&mut doc, &format!("{}{}", field, SORT_SUFFIX), json!(format!("{}/", lower)));
                    push(&mut doc, &field, json!(lower));
                }
            }
        }
    }

    Ok(Value::Object(doc))
}

/// First value of a possibly multi-valued field
fn first<'a>(doc: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    match doc.get(field)? {
        Value::Array(values) => values.first(),
        value => Some(value),
    }
}

/// Integer field value; numbers may come back as strings
pub fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn str_values<'a>(doc: &'a Map<String, Value>, field: &str) -> Vec<&'a str> {
    match doc.get(field) {
        Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(s)) => vec![s.as_str()],
        _ => Vec::new(),
    }
}

pub fn int_field(doc: &Map<String, Value>, field: &str) -> Option<i64> {
    first(doc, field).and_then(int_value)
}

pub fn decode_key(doc: &Map<String, Value>) -> Result<EventKey> {
    let uuid = first(doc, FIELD_UUID)
        .and_then(Value::as_str)
        .ok_or_else(|| IndexError::Internal("remote document without uuid".to_string()))?;
    let uuid = Uuid::parse_str(uuid)
        .map_err(|e| IndexError::Serialization(format!("Invalid remote uuid: {}", e)))?;
    let last_seen_time = int_field(doc, FIELD_LAST_SEEN_TIME)
        .and_then(from_millis)
        .ok_or_else(|| IndexError::Internal(format!("remote document {} without last seen", uuid)))?;
    Ok(EventKey {
        uuid,
        last_seen_time,
    })
}

pub fn decode_summary(doc: &Map<String, Value>) -> Result<EventSummary> {
    let record = first(doc, FIELD_RECORD)
        .and_then(Value::as_str)
        .ok_or_else(|| IndexError::Internal("remote document without record".to_string()))?;
    Ok(serde_json::from_str(record)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Event, EventDetail, EventDetailItem, EventDetailType, EventSeverity, EventTag,
    };

    fn details() -> IndexedDetails {
        IndexedDetails::new(vec![
            EventDetailItem::new("ip", EventDetailType::IpAddress),
            EventDetailItem::new("prio", EventDetailType::Integer),
        ])
    }

    #[test]
    fn test_summary_document() {
        let mut event = Event::new("Link down", EventSeverity::Error);
        event.actor.element_identifier = "Router-1".to_string();
        event.tags = vec![EventTag {
            tag_type: "zenoss.device.group".to_string(),
            uuids: vec!["g1".to_string(), "g2".to_string()],
        }];
        event.details = vec![EventDetail {
            name: "ip".to_string(),
            values: vec!["192.168.1.2".to_string()],
        }];
        let summary = EventSummary::new(event);

        let doc = to_remote_doc(&summary, DocumentShape::Summary, &details()).unwrap();
        let doc = doc.as_object().unwrap();
        assert_eq!(doc[FIELD_ELEMENT_IDENTIFIER_NOT_ANALYZED], "router-1");
        assert_eq!(str_values(doc, FIELD_TAGS), vec!["g1", "g2"]);
        assert_eq!(str_values(doc, "details.ip_ip_type"), vec!["4"]);
        assert_eq!(int_field(doc, "details.prio_i"), Some(NUMERIC_DETAIL_SENTINEL));
        assert_eq!(decode_summary(doc).unwrap(), summary);
        assert_eq!(decode_key(doc).unwrap(), EventKey::from(&summary));
    }

    #[test]
    fn test_archive_document_has_no_record() {
        let summary = EventSummary::new(Event::new("Archived", EventSeverity::Info));
        let doc = to_remote_doc(&summary, DocumentShape::Archive, &details()).unwrap();
        let doc = doc.as_object().unwrap();
        assert!(doc.get(FIELD_RECORD).is_none());
        assert!(decode_summary(doc).is_err());
        assert_eq!(decode_key(doc).unwrap().uuid, summary.uuid);
    }
}
