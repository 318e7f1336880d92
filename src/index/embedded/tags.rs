//! Tag severity aggregation over embedded index documents

use crate::error::Result;
use crate::index::constants::*;
use crate::index::document::DocumentShape;
use crate::index::embedded::schema::EventSchema;
use crate::index::tag_severity::TagSeverityAccumulator;
use crate::models::{EventSeverity, EventStatus};
use tantivy::collector::{Collector, SegmentCollector};
use tantivy::query::Query;
use tantivy::{DocAddress, DocId, Score, Searcher, SegmentOrdinal, SegmentReader, TantivyDocument};
use tracing::{debug, warn};

type IntReader = Box<dyn Fn(DocId) -> Option<i64> + Send + Sync>;
type StrReader = Box<dyn Fn(DocId) -> Vec<String> + Send + Sync>;

fn int_reader(segment: &SegmentReader, field: &str) -> tantivy::Result<IntReader> {
    let column = segment.fast_fields().i64(field)?;
    Ok(Box::new(move |doc| column.first(doc)))
}

fn str_reader(segment: &SegmentReader, field: &str) -> tantivy::Result<StrReader> {
    Ok(match segment.fast_fields().str(field)? {
        Some(column) => Box::new(move |doc| {
            column
                .term_ords(doc)
                .filter_map(|ord| {
                    let mut text = String::new();
                    match column.ord_to_str(ord, &mut text) {
                        Ok(true) => Some(text),
                        _ => None,
                    }
                })
                .collect()
        }),
        None => Box::new(|_| Vec::new()),
    })
}

/// Aggregation values of one matching document
#[derive(Debug, Clone)]
pub struct TagRow {
    element_uuid: Option<String>,
    tags: Vec<String>,
    severity: i64,
    status: i64,
    count: i64,
}

/// Rows read from fast fields, plus documents indexed before severities
/// were stored
#[derive(Debug, Default)]
pub struct TagFruit {
    rows: Vec<TagRow>,
    legacy: Vec<DocAddress>,
}

struct TagCollector;

struct TagSegmentCollector {
    segment: SegmentOrdinal,
    severity: IntReader,
    status: IntReader,
    count: IntReader,
    element_uuid: StrReader,
    tags: StrReader,
    fruit: TagFruit,
}

impl Collector for TagCollector {
    type Fruit = TagFruit;
    type Child = TagSegmentCollector;

    fn for_segment(
        &self,
        segment_local_id: SegmentOrdinal,
        segment: &SegmentReader,
    ) -> tantivy::Result<Self::Child> {
        Ok(TagSegmentCollector {
            segment: segment_local_id,
            severity: int_reader(segment, FIELD_SEVERITY)?,
            status: int_reader(segment, FIELD_STATUS)?,
            count: int_reader(segment, FIELD_COUNT)?,
            element_uuid: str_reader(segment, FIELD_ELEMENT_UUID)?,
            tags: str_reader(segment, FIELD_TAGS)?,
            fruit: TagFruit::default(),
        })
    }

    fn requires_scoring(&self) -> bool {
        false
    }

    fn merge_fruits(&self, segment_fruits: Vec<TagFruit>) -> tantivy::Result<TagFruit> {
        let mut merged = TagFruit::default();
        for fruit in segment_fruits {
            merged.rows.extend(fruit.rows);
            merged.legacy.extend(fruit.legacy);
        }
        Ok(merged)
    }
}

impl SegmentCollector for TagSegmentCollector {
    type Fruit = TagFruit;

    fn collect(&mut self, doc: DocId, _score: Score) {
        match (self.severity)(doc) {
            Some(severity) => self.fruit.rows.push(TagRow {
                element_uuid: (self.element_uuid)(doc).into_iter().next(),
                tags: (self.tags)(doc),
                severity,
                status: (self.status)(doc).unwrap_or_default(),
                count: (self.count)(doc).unwrap_or(1),
            }),
            None => self.fruit.legacy.push(DocAddress::new(self.segment, doc)),
        }
    }

    fn harvest(self) -> TagFruit {
        self.fruit
    }
}

/// Accumulate tag severities of every document matching `query`
pub fn aggregate_tags(
    searcher: &Searcher,
    schema: &EventSchema,
    shape: DocumentShape,
    query: &dyn Query,
    mut accumulator: TagSeverityAccumulator,
) -> Result<TagSeverityAccumulator> {
    let fruit = searcher.search(query, &TagCollector)?;
    debug!(
        rows = fruit.rows.len(),
        legacy = fruit.legacy.len(),
        "Tag severity documents collected"
    );

    for row in &fruit.rows {
        let Some(severity) = EventSeverity::from_ordinal(row.severity) else {
            warn!(severity = row.severity, "Unknown severity ordinal, skipping");
            continue;
        };
        let status = EventStatus::from_ordinal(row.status).unwrap_or(EventStatus::New);
        accumulator.update_indexed(
            row.element_uuid.as_deref(),
            row.tags.iter().map(String::as_str),
            severity,
            row.count.max(0) as u64,
            status,
        );
    }

    for address in fruit.legacy {
        let doc: TantivyDocument = searcher.doc(address)?;
        if !shape.stores_record() {
            let key = schema.decode_key(&doc)?;
            warn!(uuid = %key.uuid, "Archived document without severity, skipping");
            continue;
        }
        accumulator.update_summary(&schema.decode_summary(&doc)?);
    }

    Ok(accumulator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Event, EventDetailItem, EventFilter, EventSummary, EventTag, FilterOperator,
        IndexedDetails,
    };
    use tantivy::query::AllQuery;
    use tantivy::{Index, IndexWriter};
    use uuid::Uuid;

    fn summary(element: Uuid, severity: EventSeverity, count: u32) -> EventSummary {
        let mut event = Event::new("tagged", severity);
        event.actor.element_uuid = Some(element);
        event.tags = vec![EventTag {
            tag_type: "zenoss.device.group".to_string(),
            uuids: vec!["group-a".to_string()],
        }];
        let mut summary = EventSummary::new(event);
        summary.count = count;
        summary
    }

    /// A document as written before severities were indexed
    fn legacy_doc(schema: &EventSchema, summary: &EventSummary) -> TantivyDocument {
        let mut doc = TantivyDocument::new();
        doc.add_text(
            schema.field(FIELD_RECORD).unwrap(),
            serde_json::to_string(summary).unwrap(),
        );
        doc.add_text(schema.field(FIELD_UUID).unwrap(), summary.uuid.to_string());
        doc.add_i64(
            schema.field(FIELD_LAST_SEEN_TIME).unwrap(),
            summary.last_seen_time.timestamp_millis(),
        );
        doc.add_text(schema.field(FIELD_TAGS).unwrap(), "group-a");
        doc
    }

    fn searcher_with(docs: Vec<TantivyDocument>, schema: &EventSchema) -> Searcher {
        let index = Index::create_in_ram(schema.schema().clone());
        let mut writer: IndexWriter = index.writer(15_000_000).unwrap();
        for doc in docs {
            writer.add_document(doc).unwrap();
        }
        writer.commit().unwrap();
        index.reader().unwrap().searcher()
    }

    #[test]
    fn test_legacy_documents_match_indexed_documents() {
        let schema = EventSchema::new(&IndexedDetails::new(Vec::<EventDetailItem>::new()));
        let element = Uuid::new_v4();
        let first = summary(element, EventSeverity::Critical, 3);
        let second = summary(element, EventSeverity::Warning, 2);

        let filter = EventFilter::new().with_tags(FilterOperator::Or, vec!["group-a".to_string()]);

        let indexed = searcher_with(
            vec![
                schema.to_tantivy_doc(&first, DocumentShape::Summary).unwrap(),
                schema.to_tantivy_doc(&second, DocumentShape::Summary).unwrap(),
            ],
            &schema,
        );
        let legacy = searcher_with(
            vec![legacy_doc(&schema, &first), legacy_doc(&schema, &second)],
            &schema,
        );

        let run = |searcher: &Searcher| {
            aggregate_tags(
                searcher,
                &schema,
                DocumentShape::Summary,
                &AllQuery,
                TagSeverityAccumulator::new(Some(&filter)),
            )
            .unwrap()
            .finish()
        };

        let from_fields = run(&indexed);
        let from_records = run(&legacy);
        assert_eq!(from_fields, from_records);
        assert_eq!(from_fields["group-a"].total, 5);
        assert_eq!(from_fields["group-a"].count(EventSeverity::Critical), 1);
        assert_eq!(from_fields["group-a"].count(EventSeverity::Warning), 1);
    }

    #[test]
    fn test_unfiltered_keys_on_element_uuid() {
        let schema = EventSchema::new(&IndexedDetails::default());
        let element = Uuid::new_v4();
        let mut acked = summary(element, EventSeverity::Error, 1);
        acked.status = EventStatus::Acknowledged;
        let docs = [summary(element, EventSeverity::Error, 4), acked]
            .iter()
            .map(|s| schema.to_tantivy_doc(s, DocumentShape::Archive).unwrap())
            .collect();
        let searcher = searcher_with(docs, &schema);

        let result = aggregate_tags(
            &searcher,
            &schema,
            DocumentShape::Archive,
            &AllQuery,
            TagSeverityAccumulator::new(None),
        )
        .unwrap()
        .finish();

        assert_eq!(result.len(), 1);
        let severities = &result[&element.to_string()];
        assert_eq!(severities.total, 5);
        assert_eq!(severities.count(EventSeverity::Error), 2);
        assert_eq!(severities.acknowledged(EventSeverity::Error), 1);
    }
}
