//! Prometheus metrics for the index backends

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, GaugeVec,
    HistogramVec,
};

/// Index metrics collection
pub struct IndexMetrics {
    /// Searches by outcome (`ok`, `error`, `timeout`)
    pub searches_total: CounterVec,

    /// Search latency in seconds
    pub search_duration: HistogramVec,

    /// Documents written
    pub documents_indexed: CounterVec,

    /// Reader generations not yet closed
    pub open_generations: GaugeVec,

    /// Live saved searches
    pub saved_searches: GaugeVec,

    /// Index hits with no matching relational row
    pub archive_drift: CounterVec,

    /// Clause cache lookups by kind and outcome (`hit`, `miss`)
    pub clause_cache: CounterVec,
}

impl IndexMetrics {
    pub fn new() -> Self {
        Self {
            searches_total: register_counter_vec!(
                "event_index_searches_total",
                "Total number of index searches",
                &["backend", "outcome"]
            )
            .unwrap(),

            search_duration: register_histogram_vec!(
                "event_index_search_duration_seconds",
                "Index search duration in seconds",
                &["backend"],
                vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]
            )
            .unwrap(),

            documents_indexed: register_counter_vec!(
                "event_index_documents_indexed_total",
                "Total number of documents written to the index",
                &["backend"]
            )
            .unwrap(),

            open_generations: register_gauge_vec!(
                "event_index_open_generations",
                "Number of reader generations still open",
                &["backend"]
            )
            .unwrap(),

            saved_searches: register_gauge_vec!(
                "event_index_saved_searches",
                "Number of live saved searches",
                &["backend"]
            )
            .unwrap(),

            archive_drift: register_counter_vec!(
                "event_index_archive_drift_total",
                "Index hits missing from the relational store",
                &["backend"]
            )
            .unwrap(),

            clause_cache: register_counter_vec!(
                "event_index_clause_cache_hits_total",
                "Clause cache lookups",
                &["kind", "outcome"]
            )
            .unwrap(),
        }
    }

    /// Record a finished search
    pub fn record_search(&self, backend: &str, outcome: &str, duration_secs: f64) {
        self.searches_total
            .with_label_values(&[backend, outcome])
            .inc();
        self.search_duration
            .with_label_values(&[backend])
            .observe(duration_secs);
    }

    pub fn record_indexed(&self, backend: &str, documents: usize) {
        self.documents_indexed
            .with_label_values(&[backend])
            .inc_by(documents as f64);
    }

    pub fn record_drift(&self, backend: &str, missing: usize) {
        self.archive_drift
            .with_label_values(&[backend])
            .inc_by(missing as f64);
    }
}

impl Default for IndexMetrics {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    /// Global index metrics instance
    pub static ref INDEX_METRICS: IndexMetrics = IndexMetrics::new();
}

/// Initialize index metrics (idempotent)
pub fn init_index_metrics() {
    lazy_static::initialize(&INDEX_METRICS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_search() {
        init_index_metrics();
        let before = INDEX_METRICS
            .searches_total
            .with_label_values(&["metrics-test", "ok"])
            .get();
        INDEX_METRICS.record_search("metrics-test", "ok", 0.01);
        let after = INDEX_METRICS
            .searches_total
            .with_label_values(&["metrics-test", "ok"])
            .get();
        assert_eq!(after, before + 1.0);
    }
}
