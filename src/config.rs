use crate::error::{IndexError, Result};
use crate::index::config::{IndexConfig, RemoteConfig};
use crate::models::{EventDetailItem, IndexedDetails};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Event index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Summary index configuration
    #[serde(default)]
    pub index: IndexConfig,

    /// Archive index configuration
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// Remote backend configuration
    #[serde(default)]
    pub remote: Option<RemoteConfig>,

    /// Indexed event details
    #[serde(default)]
    pub details: Vec<EventDetailItem>,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("EVENT_INDEX_CONFIG")
            .unwrap_or_else(|_| "config/event-index.toml".to_string());

        let config: Config = config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: EVENT_INDEX_)
            .add_source(
                config::Environment::with_prefix("EVENT_INDEX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the backends cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.index.writer_heap_size == 0 {
            return Err(IndexError::Configuration(
                "index.writer_heap_size must be positive".to_string(),
            ));
        }
        if self.index.query_limit == 0 {
            return Err(IndexError::Configuration(
                "index.query_limit must be positive".to_string(),
            ));
        }
        if self.index.max_clause_count == 0 {
            return Err(IndexError::Configuration(
                "index.max_clause_count must be positive".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for item in &self.details {
            if !seen.insert(item.key.as_str()) {
                return Err(IndexError::Configuration(format!(
                    "detail {} configured twice",
                    item.key
                )));
            }
        }
        Ok(())
    }

    pub fn indexed_details(&self) -> IndexedDetails {
        IndexedDetails::new(self.details.iter().cloned())
    }

    /// Summary index settings with the archive path swapped in
    pub fn archive_index_config(&self) -> IndexConfig {
        IndexConfig {
            index_path: self.archive.index_path.clone(),
            ..self.index.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Path to the archive index directory
    #[serde(default = "default_archive_path")]
    pub index_path: PathBuf,

    /// Time budget for relational lookups of archived summaries
    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            index_path: default_archive_path(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_archive_path() -> PathBuf {
    PathBuf::from("./data/event_archive")
}

fn default_lookup_timeout_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}
