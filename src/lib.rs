//! Deduplicated event summary indexing and search.

pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod state;
pub mod telemetry;

pub use config::Config;
pub use error::{IndexError, Result};
pub use index::{EventIndexDao, EventIndexes};
pub use state::{EventSummaryStore, InMemoryEventStore};
