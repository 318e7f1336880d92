//! Sorted collection and time-budgeted execution of embedded searches

use crate::error::{IndexError, Result};
use crate::index::metrics::INDEX_METRICS;
use crate::index::sort::{SortKeySpec, SortValueKind};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tantivy::collector::{Collector, SegmentCollector};
use tantivy::{DocAddress, DocId, Score, SegmentOrdinal, SegmentReader};
use tracing::debug;

/// A sort value of one hit.
///
/// Inside a segment strings compare by term ordinal, which follows the
/// term order; they are resolved to text before segments are merged.
#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Missing,
    I64(i64),
    F64(f64),
    Ord(u64),
    Str(String),
}

impl SortValue {
    /// Missing values sort before present ones
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Missing, SortValue::Missing) => Ordering::Equal,
            (SortValue::Missing, _) => Ordering::Less,
            (_, SortValue::Missing) => Ordering::Greater,
            (SortValue::I64(a), SortValue::I64(b)) => a.cmp(b),
            (SortValue::F64(a), SortValue::F64(b)) => a.total_cmp(b),
            (SortValue::Ord(a), SortValue::Ord(b)) => a.cmp(b),
            (SortValue::Str(a), SortValue::Str(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// A collected hit with its sort values
#[derive(Debug, Clone)]
pub struct Hit {
    values: Vec<SortValue>,
    segment: SegmentOrdinal,
    doc: DocId,
}

fn compare_hits(keys: &[SortKeySpec], a: &Hit, b: &Hit) -> Ordering {
    for (idx, key) in keys.iter().enumerate() {
        let ord = a.values[idx].compare(&b.values[idx]);
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    (a.segment, a.doc).cmp(&(b.segment, b.doc))
}

fn keep_top(keys: &[SortKeySpec], hits: &mut Vec<Hit>, limit: usize) {
    hits.sort_by(|a, b| compare_hits(keys, a, b));
    hits.truncate(limit);
}

type ValueReader = Box<dyn Fn(DocId) -> SortValue + Send + Sync>;
type OrdResolver = Box<dyn Fn(u64) -> Option<String> + Send + Sync>;

/// Per-segment access to one sort key
struct SortColumn {
    read: ValueReader,
    resolve: Option<OrdResolver>,
}

impl SortColumn {
    fn open(segment: &SegmentReader, key: &SortKeySpec) -> tantivy::Result<Self> {
        let fast_fields = segment.fast_fields();
        let column = match key.kind {
            SortValueKind::I64 => {
                let column = fast_fields.i64(&key.field)?;
                SortColumn {
                    read: Box::new(move |doc| {
                        column.first(doc).map(SortValue::I64).unwrap_or(SortValue::Missing)
                    }),
                    resolve: None,
                }
            }
            SortValueKind::F64 => {
                let column = fast_fields.f64(&key.field)?;
                SortColumn {
                    read: Box::new(move |doc| {
                        column.first(doc).map(SortValue::F64).unwrap_or(SortValue::Missing)
                    }),
                    resolve: None,
                }
            }
            SortValueKind::Str => match fast_fields.str(&key.field)? {
                Some(column) => {
                    let dictionary = column.clone();
                    SortColumn {
                        read: Box::new(move |doc| {
                            column
                                .term_ords(doc)
                                .next()
                                .map(SortValue::Ord)
                                .unwrap_or(SortValue::Missing)
                        }),
                        resolve: Some(Box::new(move |ord| {
                            let mut text = String::new();
                            match dictionary.ord_to_str(ord, &mut text) {
                                Ok(true) => Some(text),
                                _ => None,
                            }
                        })),
                    }
                }
                None => SortColumn {
                    read: Box::new(|_| SortValue::Missing),
                    resolve: None,
                },
            },
        };
        Ok(column)
    }
}

/// Top hits of a search in sort order, plus the total match count
#[derive(Debug, Clone, Default)]
pub struct SortedHits {
    pub total: u64,
    pub docs: Vec<DocAddress>,
}

/// Collects the first `fetch` hits under a multi-key sort
pub struct SortedCollector {
    keys: Arc<[SortKeySpec]>,
    fetch: usize,
}

impl SortedCollector {
    pub fn new(keys: Arc<[SortKeySpec]>, fetch: usize) -> Self {
        Self { keys, fetch }
    }
}

pub struct SortedSegmentCollector {
    keys: Arc<[SortKeySpec]>,
    fetch: usize,
    segment: SegmentOrdinal,
    columns: Vec<SortColumn>,
    hits: Vec<Hit>,
    total: u64,
}

impl Collector for SortedCollector {
    type Fruit = SortedHits;
    type Child = SortedSegmentCollector;

    fn for_segment(
        &self,
        segment_local_id: SegmentOrdinal,
        segment: &SegmentReader,
    ) -> tantivy::Result<Self::Child> {
        let columns = self
            .keys
            .iter()
            .map(|key| SortColumn::open(segment, key))
            .collect::<tantivy::Result<Vec<_>>>()?;
        Ok(SortedSegmentCollector {
            keys: Arc::clone(&self.keys),
            fetch: self.fetch,
            segment: segment_local_id,
            columns,
            hits: Vec::new(),
            total: 0,
        })
    }

    fn requires_scoring(&self) -> bool {
        false
    }

    fn merge_fruits(&self, segment_fruits: Vec<(u64, Vec<Hit>)>) -> tantivy::Result<SortedHits> {
        let mut total = 0;
        let mut hits = Vec::new();
        for (count, segment_hits) in segment_fruits {
            total += count;
            hits.extend(segment_hits);
        }
        keep_top(&self.keys, &mut hits, self.fetch);
        Ok(SortedHits {
            total,
            docs: hits
                .into_iter()
                .map(|hit| DocAddress::new(hit.segment, hit.doc))
                .collect(),
        })
    }
}

impl SegmentCollector for SortedSegmentCollector {
    type Fruit = (u64, Vec<Hit>);

    fn collect(&mut self, doc: DocId, _score: Score) {
        self.total += 1;
        let values = self.columns.iter().map(|column| (column.read)(doc)).collect();
        self.hits.push(Hit {
            values,
            segment: self.segment,
            doc,
        });
        if self.hits.len() >= self.fetch.saturating_mul(2).max(64) {
            keep_top(&self.keys, &mut self.hits, self.fetch);
        }
    }

    fn harvest(mut self) -> Self::Fruit {
        keep_top(&self.keys, &mut self.hits, self.fetch);
        for hit in &mut self.hits {
            for (value, column) in hit.values.iter_mut().zip(&self.columns) {
                if let (SortValue::Ord(ord), Some(resolve)) = (value.clone(), &column.resolve) {
                    *value = resolve(ord).map(SortValue::Str).unwrap_or(SortValue::Missing);
                }
            }
        }
        (self.total, self.hits)
    }
}

/// Run blocking engine work on the blocking pool within an optional budget.
///
/// The work is not cancelled on timeout; its result is discarded.
pub async fn run_blocking<T, F>(backend: &str, budget: Option<Duration>, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    let started = Instant::now();
    let task = tokio::task::spawn_blocking(work);
    let joined = match budget {
        Some(budget) => match tokio::time::timeout(budget, task).await {
            Ok(joined) => joined,
            Err(_) => {
                INDEX_METRICS.record_search(backend, "timeout", started.elapsed().as_secs_f64());
                return Err(IndexError::SearchTimeout(format!(
                    "{} search exceeded {}ms",
                    backend,
                    budget.as_millis()
                )));
            }
        },
        None => task.await,
    };

    let result = joined
        .map_err(|e| IndexError::Internal(format!("Search task failed: {}", e)))
        .and_then(|result| result);
    let elapsed = started.elapsed();
    let outcome = if result.is_ok() { "ok" } else { "error" };
    INDEX_METRICS.record_search(backend, outcome, elapsed.as_secs_f64());
    debug!(backend, outcome, duration_ms = elapsed.as_millis() as u64, "Search finished");
    result
}
