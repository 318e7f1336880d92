//! Index backend configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Embedded index configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    /// Path to the index directory
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Index writer heap size in bytes (default: 50MB)
    #[serde(default = "default_writer_heap_size")]
    pub writer_heap_size: usize,

    /// Background refresh interval; 0 refreshes on every snapshot acquire
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,

    /// Maximum page size returned by a single read
    #[serde(default = "default_query_limit")]
    pub query_limit: usize,

    /// Time budget per search; 0 disables it
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    /// Maximum clauses produced by a single wildcard expansion
    #[serde(default = "default_max_clause_count")]
    pub max_clause_count: usize,

    /// Entries per clause cache kind
    #[serde(default = "default_clause_cache_capacity")]
    pub clause_cache_capacity: u64,

    /// Commit after every DAO write
    #[serde(default)]
    pub realtime_indexing: bool,

    /// Run a warm-up search when the backend opens
    #[serde(default)]
    pub warm_on_start: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_path: default_index_path(),
            writer_heap_size: default_writer_heap_size(),
            refresh_interval_ms: default_refresh_interval_ms(),
            query_limit: default_query_limit(),
            search_timeout_ms: default_search_timeout_ms(),
            max_clause_count: default_max_clause_count(),
            clause_cache_capacity: default_clause_cache_capacity(),
            realtime_indexing: false,
            warm_on_start: false,
        }
    }
}

impl IndexConfig {
    pub fn refresh_interval(&self) -> Option<Duration> {
        match self.refresh_interval_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn search_timeout(&self) -> Option<Duration> {
        match self.search_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Remote (Solr-compatible) backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    /// Base URL of the search server
    #[serde(default = "default_remote_url")]
    pub url: String,

    /// Collection (core) name
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Maximum rows fetched by a single select
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,

    /// Delay between readiness pings during initialization
    #[serde(default = "default_init_retry_ms")]
    pub init_retry_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: default_remote_url(),
            collection: default_collection(),
            request_timeout_ms: default_request_timeout_ms(),
            max_rows: default_max_rows(),
            init_retry_ms: default_init_retry_ms(),
        }
    }
}

impl RemoteConfig {
    pub fn collection_url(&self) -> String {
        format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            self.collection.trim_matches('/')
        )
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./data/event_index")
}

fn default_writer_heap_size() -> usize {
    50_000_000
}

fn default_refresh_interval_ms() -> u64 {
    1000
}

fn default_query_limit() -> usize {
    1000
}

fn default_search_timeout_ms() -> u64 {
    30_000
}

fn default_max_clause_count() -> usize {
    1024
}

fn default_clause_cache_capacity() -> u64 {
    1000
}

fn default_remote_url() -> String {
    "http://localhost:8983/solr".to_string()
}

fn default_collection() -> String {
    "event_summary".to_string()
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_max_rows() -> usize {
    10_000
}

fn default_init_retry_ms() -> u64 {
    5_000
}

/// Builder for IndexConfig
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: IndexConfig::default(),
        }
    }

    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_path = path.into();
        self
    }

    pub fn writer_heap_size(mut self, size: usize) -> Self {
        self.config.writer_heap_size = size;
        self
    }

    pub fn refresh_interval_ms(mut self, ms: u64) -> Self {
        self.config.refresh_interval_ms = ms;
        self
    }

    pub fn query_limit(mut self, limit: usize) -> Self {
        self.config.query_limit = limit;
        self
    }

    pub fn search_timeout_ms(mut self, ms: u64) -> Self {
        self.config.search_timeout_ms = ms;
        self
    }

    pub fn max_clause_count(mut self, count: usize) -> Self {
        self.config.max_clause_count = count;
        self
    }

    pub fn clause_cache_capacity(mut self, capacity: u64) -> Self {
        self.config.clause_cache_capacity = capacity;
        self
    }

    pub fn realtime_indexing(mut self, enabled: bool) -> Self {
        self.config.realtime_indexing = enabled;
        self
    }

    pub fn warm_on_start(mut self, enabled: bool) -> Self {
        self.config.warm_on_start = enabled;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}

impl Default for IndexConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides() {
        let config = IndexConfigBuilder::new()
            .index_path("/tmp/events")
            .refresh_interval_ms(0)
            .query_limit(50)
            .build();

        assert_eq!(config.index_path, PathBuf::from("/tmp/events"));
        assert_eq!(config.refresh_interval(), None);
        assert_eq!(config.query_limit, 50);
        assert_eq!(config.max_clause_count, 1024);
    }

    #[test]
    fn test_remote_collection_url() {
        let config = RemoteConfig {
            url: "http://solr:8983/solr/".to_string(),
            ..Default::default()
        };
        assert_eq!(config.collection_url(), "http://solr:8983/solr/event_summary");
    }
}
