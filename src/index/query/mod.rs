//! Filter-to-query compilation.
//!
//! [`QueryCompiler`] walks an [`EventFilter`](crate::models::EventFilter)
//! and emits clauses through a [`ClauseFactory`], so the embedded engine and
//! the remote transport share one set of per-field strategies.

pub mod builder;
pub mod range;
pub mod text;

pub use builder::QueryCompiler;
pub use range::{coalesce, coalesce_ordinals, parse_numeric_value, Range, RangeBound};

use crate::error::Result;
use crate::index::analysis::AnalyzedToken;
use crate::models::EventDetailItem;

/// How a clause participates in its boolean parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

/// Per-field match strategies, in emission order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    DateRange,
    EnumNumber,
    FullText,
    Identifier,
    IpAddressSubstring,
    IpAddress,
    IpAddressRange,
    NumericRange,
    Path,
    Term,
    Wildcard,
}

/// Backend capability for building query clauses.
///
/// Text arguments arrive already normalized (lowercased, unquoted) by the
/// compiler; factories only render or construct.
pub trait ClauseFactory {
    type Clause: Clone;

    /// Index field holding a configured detail
    fn detail_field(&self, item: &EventDetailItem) -> String;

    fn match_all(&self) -> Self::Clause;

    fn term(&self, field: &str, value: &str) -> Result<Self::Clause>;

    /// Any of the given terms
    fn terms(&self, field: &str, values: &[String]) -> Result<Self::Clause>;

    fn prefix(&self, field: &str, prefix: &str) -> Result<Self::Clause>;

    /// `*` matches any run, `?` any single character
    fn wildcard(&self, field: &str, pattern: &str) -> Result<Self::Clause>;

    fn long_range(&self, field: &str, from: Option<i64>, to: Option<i64>) -> Result<Self::Clause>;

    fn double_range(&self, field: &str, from: Option<f64>, to: Option<f64>)
        -> Result<Self::Clause>;

    /// Inclusive lexicographic range
    fn string_range(&self, field: &str, from: &str, to: &str) -> Result<Self::Clause>;

    /// N-gram phrase for an identifier value; `grams` carry positions
    fn ngram_phrase(
        &self,
        field: &str,
        value: &str,
        grams: &[AnalyzedToken],
    ) -> Result<Self::Clause>;

    /// Phrase whose tokens may carry wildcards
    fn wildcard_phrase(&self, field: &str, tokens: &[String]) -> Result<Self::Clause>;

    fn boolean(&self, clauses: Vec<(Occur, Self::Clause)>) -> Self::Clause;
}
