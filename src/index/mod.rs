//! Event summary index: query compilation, embedded and remote backends,
//! snapshots, saved searches and the DAO tying them together.

pub mod analysis;
pub mod backend;
pub mod cache;
pub mod config;
pub mod constants;
pub mod dao;
pub mod document;
pub mod embedded;
pub mod ip;
pub mod materializer;
pub mod metrics;
pub mod query;
pub mod reconcile;
pub mod remote;
pub mod saved_search;
pub mod snapshot;
pub mod sort;
pub mod tag_severity;

pub use backend::{EventIndexBackend, FieldSelector};
pub use cache::{ClauseCache, ClauseKind};
pub use config::{IndexConfig, IndexConfigBuilder, RemoteConfig};
pub use constants::INDEX_VERSION;
pub use dao::{EventIndexDao, EventIndexes, ARCHIVE_INDEX, SUMMARY_INDEX};
pub use document::DocumentShape;
pub use embedded::EmbeddedBackend;
pub use materializer::PageWindow;
pub use metrics::{init_index_metrics, INDEX_METRICS};
pub use query::{ClauseFactory, Occur, QueryCompiler};
pub use reconcile::ArchiveReconciler;
pub use remote::RemoteBackend;
pub use saved_search::{SavedSearchHold, SavedSearchRegistry};
pub use snapshot::{Snapshot, SnapshotPool};
pub use tag_severity::TagSeverityAccumulator;
