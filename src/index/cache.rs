//! Memoization of compiled filter clauses.
//!
//! Prefix, wildcard, term-set and n-gram clauses are cached by their kind,
//! field and terms. Each kind has its own bounded cache so a burst of one
//! kind cannot evict the others.

use crate::index::metrics::INDEX_METRICS;
use moka::sync::Cache;
use strum::{AsRefStr, EnumCount};

/// Cacheable clause kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumCount)]
#[strum(serialize_all = "snake_case")]
pub enum ClauseKind {
    Prefix,
    Terms,
    Wildcard,
    Ngram,
}

impl ClauseKind {
    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ClauseKey {
    field: String,
    terms: Vec<String>,
}

/// Bounded per-kind clause cache
#[derive(Clone)]
pub struct ClauseCache<C>
where
    C: Clone + Send + Sync + 'static,
{
    caches: Vec<Cache<ClauseKey, C>>,
}

impl<C> ClauseCache<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// `capacity` entries per kind
    pub fn new(capacity: u64) -> Self {
        let caches = (0..ClauseKind::COUNT)
            .map(|_| Cache::builder().max_capacity(capacity).build())
            .collect();
        Self { caches }
    }

    /// Return the cached clause or build and cache it
    pub fn get_or_try_insert<E>(
        &self,
        kind: ClauseKind,
        field: &str,
        terms: &[String],
        build: impl FnOnce() -> std::result::Result<C, E>,
    ) -> std::result::Result<C, E> {
        let cache = &self.caches[kind.slot()];
        let key = ClauseKey {
            field: field.to_string(),
            terms: terms.to_vec(),
        };

        if let Some(clause) = cache.get(&key) {
            INDEX_METRICS
                .clause_cache
                .with_label_values(&[kind.as_ref(), "hit"])
                .inc();
            return Ok(clause);
        }

        INDEX_METRICS
            .clause_cache
            .with_label_values(&[kind.as_ref(), "miss"])
            .inc();
        let clause = build()?;
        cache.insert(key, clause.clone());
        Ok(clause)
    }

    /// Cached entries of one kind
    pub fn entry_count(&self, kind: ClauseKind) -> u64 {
        let cache = &self.caches[kind.slot()];
        cache.run_pending_tasks();
        cache.entry_count()
    }

    pub fn invalidate_all(&self) {
        for cache in &self.caches {
            cache.invalidate_all();
        }
    }
}
