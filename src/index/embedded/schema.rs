//! Event document schema for the embedded engine

use crate::error::{IndexError, Result};
use crate::index::analysis::Analyzer;
use crate::index::constants::*;
use crate::index::document::{indexed_detail_values, DetailValue, DocumentShape};
use crate::index::ip;
use crate::models::{
    from_millis, to_millis, EventDetailItem, EventDetailType, EventKey, EventSummary,
    IndexedDetails,
};
use tantivy::schema::*;
use tantivy::tokenizer::{PreTokenizedString, Token};
use tantivy::TantivyDocument;
use uuid::Uuid;

/// Prefix of every detail field
pub const DETAIL_FIELD_PREFIX: &str = "details_";

/// Index field holding a configured detail
pub fn detail_field_name(item: &EventDetailItem) -> String {
    format!("{}{}", DETAIL_FIELD_PREFIX, item.key.replace('.', "_"))
}

/// Positions are kept so phrase clauses work; text arrives pre-tokenized
fn analyzed() -> TextOptions {
    TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer("raw")
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    )
}

/// Schema plus the detail configuration it was built from
#[derive(Debug, Clone)]
pub struct EventSchema {
    schema: Schema,
    details: IndexedDetails,
}

impl EventSchema {
    pub fn new(details: &IndexedDetails) -> Self {
        Self {
            schema: build_event_schema(details),
            details: details.clone(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn details(&self) -> &IndexedDetails {
        &self.details
    }

    pub fn field(&self, name: &str) -> Result<Field> {
        self.schema
            .get_field(name)
            .map_err(|_| IndexError::UnsupportedField(name.to_string()))
    }

    /// Convert a summary to a document of the given shape
    pub fn to_tantivy_doc(
        &self,
        summary: &EventSummary,
        shape: DocumentShape,
    ) -> Result<TantivyDocument> {
        let mut doc = TantivyDocument::new();
        let event = &summary.occurrence;
        let actor = &event.actor;

        // Archived summaries are read back from the relational store
        if shape.stores_record() {
            doc.add_text(self.field(FIELD_RECORD)?, serde_json::to_string(summary)?);
        }

        doc.add_text(self.field(FIELD_UUID)?, summary.uuid.to_string());
        doc.add_text(
            self.field(FIELD_CURRENT_USER_NAME)?,
            summary.current_user_name.as_deref().unwrap_or_default(),
        );

        doc.add_i64(self.field(FIELD_STATUS)?, summary.status.ordinal() as i64);
        doc.add_i64(self.field(FIELD_SEVERITY)?, event.severity.ordinal() as i64);
        doc.add_i64(self.field(FIELD_COUNT)?, summary.count as i64);
        doc.add_i64(self.field(FIELD_LAST_SEEN_TIME)?, to_millis(&summary.last_seen_time));
        doc.add_i64(self.field(FIELD_FIRST_SEEN_TIME)?, to_millis(&summary.first_seen_time));
        doc.add_i64(
            self.field(FIELD_STATUS_CHANGE_TIME)?,
            to_millis(&summary.status_change_time),
        );
        doc.add_i64(self.field(FIELD_UPDATE_TIME)?, to_millis(&summary.update_time));

        doc.add_text(self.field(FIELD_FINGERPRINT)?, &event.fingerprint);
        add_analyzed(&mut doc, self.field(FIELD_SUMMARY)?, &event.summary, Analyzer::Summary);
        doc.add_text(
            self.field(FIELD_SUMMARY_NOT_ANALYZED)?,
            event.summary.to_lowercase(),
        );
        add_analyzed(&mut doc, self.field(FIELD_EVENT_CLASS)?, &event.event_class, Analyzer::Path);
        // Trailing slash so class prefixes never match a sibling class
        doc.add_text(
            self.field(FIELD_EVENT_CLASS_NOT_ANALYZED)?,
            format!("{}/", event.event_class.to_lowercase()),
        );
        doc.add_text(self.field(FIELD_AGENT)?, &event.agent);
        doc.add_text(self.field(FIELD_MONITOR)?, &event.monitor);
        doc.add_text(self.field(FIELD_EVENT_KEY)?, &event.event_key);
        doc.add_text(self.field(FIELD_EVENT_CLASS_KEY)?, &event.event_class_key);
        doc.add_text(self.field(FIELD_EVENT_GROUP)?, &event.event_group);
        add_analyzed(&mut doc, self.field(FIELD_MESSAGE)?, &event.message, Analyzer::Summary);

        // Tags (multi-valued): tag uuids, then the element and sub-element
        let tags = self.field(FIELD_TAGS)?;
        for tag in &event.tags {
            for uuid in &tag.uuids {
                doc.add_text(tags, uuid);
            }
        }
        if let Some(uuid) = actor.element_uuid {
            doc.add_text(tags, uuid.to_string());
            doc.add_text(self.field(FIELD_ELEMENT_UUID)?, uuid.to_string());
        }
        if let Some(uuid) = actor.element_sub_uuid {
            doc.add_text(tags, uuid.to_string());
            doc.add_text(self.field(FIELD_ELEMENT_SUB_UUID)?, uuid.to_string());
        }

        for (field, value) in [
            (FIELD_ELEMENT_IDENTIFIER, &actor.element_identifier),
            (FIELD_ELEMENT_TITLE, &actor.element_title),
            (FIELD_ELEMENT_SUB_IDENTIFIER, &actor.element_sub_identifier),
            (FIELD_ELEMENT_SUB_TITLE, &actor.element_sub_title),
        ] {
            add_analyzed(&mut doc, self.field(field)?, value, Analyzer::Identifier);
            doc.add_text(self.field(&non_analyzed_field(field))?, value.to_lowercase());
        }

        for (item, values) in indexed_detail_values(summary, &self.details) {
            self.add_detail(&mut doc, item, values)?;
        }

        Ok(doc)
    }

    fn add_detail(
        &self,
        doc: &mut TantivyDocument,
        item: &EventDetailItem,
        values: Vec<DetailValue>,
    ) -> Result<()> {
        let name = detail_field_name(item);
        let field = self.field(&name)?;

        for value in values {
            match value {
                DetailValue::Long(v) => doc.add_i64(field, v),
                DetailValue::Double(v) => doc.add_f64(field, v),
                DetailValue::Text(text) => match item.detail_type {
                    EventDetailType::IpAddress | EventDetailType::Path => {
                        add_single_token(doc, field, &text)
                    }
                    _ => doc.add_text(field, &text),
                },
                DetailValue::Address(addr) => {
                    let ip_type = if ip::is_ipv6(&addr) {
                        IP_ADDRESS_TYPE_6
                    } else {
                        IP_ADDRESS_TYPE_4
                    };
                    doc.add_text(
                        self.field(&format!("{}{}", name, IP_ADDRESS_TYPE_SUFFIX))?,
                        ip_type,
                    );
                    doc.add_text(
                        self.field(&format!("{}{}", name, SORT_SUFFIX))?,
                        ip::canonical_ip_address(&addr),
                    );
                    add_analyzed(doc, field, &ip::host_address(&addr), Analyzer::Ip);
                }
                DetailValue::Path(path) => {
                    let lower = path.to_lowercase();
                    add_analyzed(doc, field, &lower, Analyzer::Path);
                    doc.add_text(
                        self.field(&format!("{}{}", name, SORT_SUFFIX))?,
                        format!("{}/", lower),
                    );
                }
            }
        }
        Ok(())
    }

    /// Uuid and last seen time of a stored document
    pub fn decode_key(&self, doc: &TantivyDocument) -> Result<EventKey> {
        let uuid = doc
            .get_first(self.field(FIELD_UUID)?)
            .and_then(|v| v.as_str())
            .ok_or_else(|| IndexError::Internal("document without uuid".to_string()))?;
        let uuid = Uuid::parse_str(uuid)
            .map_err(|e| IndexError::Serialization(format!("Invalid stored uuid: {}", e)))?;
        let last_seen = doc
            .get_first(self.field(FIELD_LAST_SEEN_TIME)?)
            .and_then(|v| v.as_i64())
            .and_then(from_millis)
            .ok_or_else(|| IndexError::Internal(format!("document {} without last seen", uuid)))?;

        Ok(EventKey {
            uuid,
            last_seen_time: last_seen,
        })
    }

    /// Full summary of a summary-shape document
    pub fn decode_summary(&self, doc: &TantivyDocument) -> Result<EventSummary> {
        let record = doc
            .get_first(self.field(FIELD_RECORD)?)
            .and_then(|v| v.as_str())
            .ok_or_else(|| IndexError::Internal("document without record".to_string()))?;
        Ok(serde_json::from_str(record)?)
    }
}

fn add_analyzed(doc: &mut TantivyDocument, field: Field, text: &str, analyzer: Analyzer) {
    let tokens = analyzer
        .tokens(text)
        .into_iter()
        .map(|t| Token {
            offset_from: t.offset_from,
            offset_to: t.offset_to,
            position: t.position,
            text: t.text,
            position_length: 1,
        })
        .collect();
    doc.add_pre_tokenized_text(
        field,
        PreTokenizedString {
            text: text.to_string(),
            tokens,
        },
    );
}

/// Index `text` verbatim as the only token of an analyzed field
fn add_single_token(doc: &mut TantivyDocument, field: Field, text: &str) {
    doc.add_pre_tokenized_text(
        field,
        PreTokenizedString {
            text: text.to_string(),
            tokens: vec![Token {
                offset_from: 0,
                offset_to: text.len(),
                position: 0,
                text: text.to_string(),
                position_length: 1,
            }],
        },
    );
}

/// Build the event schema for a detail configuration
pub fn build_event_schema(details: &IndexedDetails) -> Schema {
    let mut schema_builder = Schema::builder();

    // Serialized summary, never indexed
    schema_builder.add_text_field(FIELD_RECORD, STORED);

    // Identity
    schema_builder.add_text_field(FIELD_UUID, STRING | STORED | FAST);
    schema_builder.add_text_field(FIELD_FINGERPRINT, STRING | FAST);
    schema_builder.add_text_field(FIELD_CURRENT_USER_NAME, STRING | FAST);

    // Ordinals and counters
    schema_builder.add_i64_field(FIELD_STATUS, INDEXED | STORED | FAST);
    schema_builder.add_i64_field(FIELD_SEVERITY, INDEXED | STORED | FAST);
    schema_builder.add_i64_field(FIELD_COUNT, INDEXED | STORED | FAST);

    // Epoch millis
    schema_builder.add_i64_field(FIELD_LAST_SEEN_TIME, INDEXED | STORED | FAST);
    schema_builder.add_i64_field(FIELD_FIRST_SEEN_TIME, INDEXED | FAST);
    schema_builder.add_i64_field(FIELD_STATUS_CHANGE_TIME, INDEXED | FAST);
    schema_builder.add_i64_field(FIELD_UPDATE_TIME, INDEXED | FAST);

    // Analyzed text with not-analyzed siblings for sorting and prefixes
    schema_builder.add_text_field(FIELD_SUMMARY, analyzed());
    schema_builder.add_text_field(FIELD_SUMMARY_NOT_ANALYZED, STRING | FAST);
    schema_builder.add_text_field(FIELD_MESSAGE, analyzed());
    schema_builder.add_text_field(FIELD_EVENT_CLASS, analyzed());
    schema_builder.add_text_field(FIELD_EVENT_CLASS_NOT_ANALYZED, STRING | FAST);
    for field in [
        FIELD_ELEMENT_IDENTIFIER,
        FIELD_ELEMENT_TITLE,
        FIELD_ELEMENT_SUB_IDENTIFIER,
        FIELD_ELEMENT_SUB_TITLE,
    ] {
        schema_builder.add_text_field(field, analyzed());
        schema_builder.add_text_field(&non_analyzed_field(field), STRING | FAST);
    }

    // Exact-match keys
    for field in [
        FIELD_AGENT,
        FIELD_MONITOR,
        FIELD_EVENT_KEY,
        FIELD_EVENT_CLASS_KEY,
        FIELD_EVENT_GROUP,
    ] {
        schema_builder.add_text_field(field, STRING | FAST);
    }

    // Tags - multi-valued, read back by the severity aggregation
    schema_builder.add_text_field(FIELD_TAGS, STRING | STORED | FAST);
    schema_builder.add_text_field(FIELD_ELEMENT_UUID, STRING | STORED | FAST);
    schema_builder.add_text_field(FIELD_ELEMENT_SUB_UUID, STRING | STORED | FAST);

    for item in details.iter() {
        let name = detail_field_name(item);
        match item.detail_type {
            EventDetailType::String => {
                schema_builder.add_text_field(&name, STRING | FAST);
            }
            EventDetailType::Integer | EventDetailType::Long => {
                schema_builder.add_i64_field(&name, INDEXED | FAST);
            }
            EventDetailType::Float | EventDetailType::Double => {
                schema_builder.add_f64_field(&name, INDEXED | FAST);
            }
            EventDetailType::IpAddress => {
                schema_builder.add_text_field(&name, analyzed());
                schema_builder
                    .add_text_field(&format!("{}{}", name, IP_ADDRESS_TYPE_SUFFIX), STRING | FAST);
                schema_builder.add_text_field(&format!("{}{}", name, SORT_SUFFIX), STRING | FAST);
            }
            EventDetailType::Path => {
                schema_builder.add_text_field(&name, analyzed());
                schema_builder.add_text_field(&format!("{}{}", name, SORT_SUFFIX), STRING | FAST);
            }
        }
    }

    schema_builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, EventDetail, EventSeverity};

    fn details() -> IndexedDetails {
        IndexedDetails::new(vec![
            EventDetailItem::new("zenoss.device.ip_address", EventDetailType::IpAddress),
            EventDetailItem::new("zenoss.device.location", EventDetailType::Path),
            EventDetailItem::new("zenoss.device.priority", EventDetailType::Integer),
        ])
    }

    fn summary() -> EventSummary {
        let mut event = Event::new("Disk almost full", EventSeverity::Error);
        event.actor.element_identifier = "db01.example.com".to_string();
        event.actor.element_uuid = Some(Uuid::new_v4());
        event.details = vec![
            EventDetail {
                name: "zenoss.device.ip_address".to_string(),
                values: vec!["::1".to_string()],
            },
            EventDetail {
                name: "zenoss.device.location".to_string(),
                values: vec!["/Austin/Lab".to_string()],
            },
        ];
        EventSummary::new(event)
    }

    #[test]
    fn test_schema_building() {
        let schema = build_event_schema(&details());
        assert!(schema.get_field(FIELD_UUID).is_ok());
        assert!(schema.get_field(FIELD_ELEMENT_TITLE_NOT_ANALYZED).is_ok());
        assert!(schema.get_field("details_zenoss_device_ip_address_type").is_ok());
        assert!(schema.get_field("details_zenoss_device_ip_address_sort").is_ok());
        assert!(schema.get_field("details_zenoss_device_location_sort").is_ok());
        assert!(schema.get_field("details_zenoss_device_priority_sort").is_err());
    }

    #[test]
    fn test_summary_shape_round_trips_record() {
        let schema = EventSchema::new(&details());
        let summary = summary();
        let doc = schema.to_tantivy_doc(&summary, DocumentShape::Summary).unwrap();

        assert_eq!(schema.decode_summary(&doc).unwrap(), summary);
        let key = schema.decode_key(&doc).unwrap();
        assert_eq!(key.uuid, summary.uuid);
    }

    #[test]
    fn test_archive_shape_has_no_record() {
        let schema = EventSchema::new(&details());
        let summary = summary();
        let doc = schema.to_tantivy_doc(&summary, DocumentShape::Archive).unwrap();

        assert!(schema.decode_summary(&doc).is_err());
        assert_eq!(schema.decode_key(&doc).unwrap().uuid, summary.uuid);
    }

    #[test]
    fn test_detail_encodings() {
        let schema = EventSchema::new(&details());
        let doc = schema.to_tantivy_doc(&summary(), DocumentShape::Summary).unwrap();

        let sort = schema.field("details_zenoss_device_ip_address_sort").unwrap();
        let canonical = doc.get_first(sort).and_then(|v| v.as_str()).map(str::to_string);
        assert_eq!(
            canonical.as_deref(),
            Some("0000:0000:0000:0000:0000:0000:0000:0001")
        );

        let path = schema.field("details_zenoss_device_location_sort").unwrap();
        let stored = doc.get_first(path).and_then(|v| v.as_str()).map(str::to_string);
        assert_eq!(stored.as_deref(), Some("/austin/lab/"));

        let priority = schema.field("details_zenoss_device_priority").unwrap();
        let sentinel = doc.get_first(priority).and_then(|v| v.as_i64());
        assert_eq!(sentinel, Some(NUMERIC_DETAIL_SENTINEL));
    }
}
