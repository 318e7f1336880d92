//! Clause construction over tantivy queries

use crate::error::{IndexError, Result};
use crate::index::analysis::AnalyzedToken;
use crate::index::cache::{ClauseCache, ClauseKind};
use crate::index::embedded::schema::{detail_field_name, EventSchema};
use crate::index::query::text::has_wildcard;
use crate::index::query::{ClauseFactory, Occur};
use crate::models::EventDetailItem;
use regex::Regex;
use std::collections::BTreeSet;
use std::ops::Bound;
use tantivy::query::{
    AllQuery, BooleanQuery, Occur as TantivyOccur, PhraseQuery, Query, QueryClone, RangeQuery,
    RegexQuery, TermQuery, TermSetQuery,
};
use tantivy::schema::{Field, IndexRecordOption};
use tantivy::{Searcher, Term};

/// A cloneable tantivy query
pub struct Clause(Box<dyn Query>);

impl Clause {
    pub fn new(query: impl Query) -> Self {
        Clause(Box::new(query))
    }

    pub fn into_query(self) -> Box<dyn Query> {
        self.0
    }

    pub fn query(&self) -> &dyn Query {
        self.0.as_ref()
    }
}

impl Clone for Clause {
    fn clone(&self) -> Self {
        Clause(self.0.box_clone())
    }
}

impl std::fmt::Debug for Clause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Regex for a `*`/`?` wildcard pattern; everything else is literal
pub fn wildcard_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 8);
    for c in pattern.chars() {
        match c {
            '*' => regex.push_str(".*"),
            '?' => regex.push('.'),
            '\\' | '.' | '+' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' => {
                regex.push('\\');
                regex.push(c);
            }
            c => regex.push(c),
        }
    }
    regex
}

/// Literal text before the first wildcard character
fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?']) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}

/// Builds tantivy queries against one searcher generation.
///
/// Wildcard phrases are expanded against the term dictionaries of that
/// generation, so clauses must not outlive it.
pub struct TantivyClauses<'a> {
    schema: &'a EventSchema,
    searcher: &'a Searcher,
    cache: &'a ClauseCache<Clause>,
    max_clause_count: usize,
}

impl<'a> TantivyClauses<'a> {
    pub fn new(
        schema: &'a EventSchema,
        searcher: &'a Searcher,
        cache: &'a ClauseCache<Clause>,
        max_clause_count: usize,
    ) -> Self {
        Self {
            schema,
            searcher,
            cache,
            max_clause_count,
        }
    }

    fn field(&self, name: &str) -> Result<Field> {
        self.schema.field(name)
    }

    fn regex(&self, field: &str, pattern: &str) -> Result<Clause> {
        let query = RegexQuery::from_pattern(&wildcard_to_regex(pattern), self.field(field)?)
            .map_err(|e| IndexError::InvalidArgument(format!("Invalid pattern {}: {}", pattern, e)))?;
        Ok(Clause::new(query))
    }

    /// Every indexed term of `field` matching a wildcard token
    fn expand(&self, field: Field, token: &str) -> Result<Vec<String>> {
        let matcher = Regex::new(&format!("^{}$", wildcard_to_regex(token)))
            .map_err(|e| IndexError::InvalidArgument(format!("Invalid pattern {}: {}", token, e)))?;
        let prefix = literal_prefix(token);
        let mut matches = BTreeSet::new();

        for segment in self.searcher.segment_readers() {
            let inverted = segment.inverted_index(field)?;
            let mut stream = inverted.terms().range().ge(prefix.as_bytes()).into_stream()?;
            while stream.advance() {
                let key = stream.key();
                if !key.starts_with(prefix.as_bytes()) {
                    break;
                }
                if let Ok(term) = std::str::from_utf8(key) {
                    if matcher.is_match(term) {
                        matches.insert(term.to_string());
                        if matches.len() > self.max_clause_count {
                            return Err(too_many_clauses(token));
                        }
                    }
                }
            }
        }
        Ok(matches.into_iter().collect())
    }
}

fn too_many_clauses(value: &str) -> IndexError {
    IndexError::InvalidArgument(format!("Too many clauses expanding {}", value))
}

fn to_tantivy(occur: Occur) -> TantivyOccur {
    match occur {
        Occur::Must => TantivyOccur::Must,
        Occur::Should => TantivyOccur::Should,
        Occur::MustNot => TantivyOccur::MustNot,
    }
}

fn bound<T>(value: Option<T>) -> Bound<T> {
    match value {
        Some(v) => Bound::Included(v),
        None => Bound::Unbounded,
    }
}

impl<'a> ClauseFactory for TantivyClauses<'a> {
    type Clause = Clause;

    fn detail_field(&self, item: &EventDetailItem) -> String {
        detail_field_name(item)
    }

    fn match_all(&self) -> Clause {
        Clause::new(AllQuery)
    }

    fn term(&self, field: &str, value: &str) -> Result<Clause> {
        let term = Term::from_field_text(self.field(field)?, value);
        Ok(Clause::new(TermQuery::new(term, IndexRecordOption::Basic)))
    }

    fn terms(&self, field: &str, values: &[String]) -> Result<Clause> {
        if let [value] = values {
            return self.term(field, value);
        }
        self.cache
            .get_or_try_insert(ClauseKind::Terms, field, values, || {
                let field = self.field(field)?;
                let terms = values.iter().map(|v| Term::from_field_text(field, v));
                Ok(Clause::new(TermSetQuery::new(terms)))
            })
    }

    fn prefix(&self, field: &str, prefix: &str) -> Result<Clause> {
        self.cache
            .get_or_try_insert(ClauseKind::Prefix, field, &[prefix.to_string()], || {
                self.regex(field, &format!("{}*", prefix.replace(['*', '?'], "")))
            })
    }

    fn wildcard(&self, field: &str, pattern: &str) -> Result<Clause> {
        if !has_wildcard(pattern) {
            return self.term(field, pattern);
        }
        self.cache
            .get_or_try_insert(ClauseKind::Wildcard, field, &[pattern.to_string()], || {
                self.regex(field, pattern)
            })
    }

    fn long_range(&self, field: &str, from: Option<i64>, to: Option<i64>) -> Result<Clause> {
        if from.is_none() && to.is_none() {
            return Ok(self.match_all());
        }
        self.field(field)?;
        Ok(Clause::new(RangeQuery::new_i64_bounds(
            field.to_string(),
            bound(from),
            bound(to),
        )))
    }

    fn double_range(&self, field: &str, from: Option<f64>, to: Option<f64>) -> Result<Clause> {
        if from.is_none() && to.is_none() {
            return Ok(self.match_all());
        }
        self.field(field)?;
        Ok(Clause::new(RangeQuery::new_f64_bounds(
            field.to_string(),
            bound(from),
            bound(to),
        )))
    }

    fn string_range(&self, field: &str, from: &str, to: &str) -> Result<Clause> {
        self.field(field)?;
        Ok(Clause::new(RangeQuery::new_str_bounds(
            field.to_string(),
            Bound::Included(from),
            Bound::Included(to),
        )))
    }

    fn ngram_phrase(&self, field: &str, value: &str, grams: &[AnalyzedToken]) -> Result<Clause> {
        let key: Vec<String> = grams
            .iter()
            .map(|g| format!("{}@{}", g.text, g.position))
            .collect();
        self.cache.get_or_try_insert(ClauseKind::Ngram, field, &key, || {
            let field_handle = self.field(field)?;
            match grams {
                [] => Err(IndexError::InvalidArgument(format!("No grams for {}", value))),
                [gram] => self.term(field, &gram.text),
                _ => {
                    let terms = grams
                        .iter()
                        .map(|g| (g.position, Term::from_field_text(field_handle, &g.text)))
                        .collect();
                    Ok(Clause::new(PhraseQuery::new_with_offset(terms)))
                }
            }
        })
    }

    fn wildcard_phrase(&self, field: &str, tokens: &[String]) -> Result<Clause> {
        let field_handle = self.field(field)?;

        let mut positions: Vec<Vec<String>> = Vec::with_capacity(tokens.len());
        for token in tokens {
            let alternatives = if has_wildcard(token) {
                self.expand(field_handle, token)?
            } else {
                Vec::new()
            };
            // An unmatched wildcard stays literal so the phrase matches nothing
            positions.push(if alternatives.is_empty() {
                vec![token.clone()]
            } else {
                alternatives
            });
        }

        match positions.as_slice() {
            [] => Err(IndexError::InvalidArgument("Empty phrase".to_string())),
            [single] => self.terms(field, single),
            _ => {
                let combinations = positions
                    .iter()
                    .try_fold(1usize, |acc, alternatives| acc.checked_mul(alternatives.len()))
                    .filter(|n| *n <= self.max_clause_count)
                    .ok_or_else(|| too_many_clauses(&tokens.join(" ")))?;

                let mut phrases: Vec<Vec<&String>> = Vec::with_capacity(combinations);
                phrases.push(Vec::new());
                for alternatives in &positions {
                    phrases = phrases
                        .into_iter()
                        .flat_map(|prefix| {
                            alternatives.iter().map(move |term| {
                                let mut next = prefix.clone();
                                next.push(term);
                                next
                            })
                        })
                        .collect();
                }

                let mut clauses: Vec<(TantivyOccur, Box<dyn Query>)> = phrases
                    .into_iter()
                    .map(|phrase| {
                        let terms = phrase
                            .into_iter()
                            .map(|text| Term::from_field_text(field_handle, text))
                            .collect();
                        let query: Box<dyn Query> = Box::new(PhraseQuery::new(terms));
                        (TantivyOccur::Should, query)
                    })
                    .collect();
                if clauses.len() == 1 {
                    if let Some((_, query)) = clauses.pop() {
                        return Ok(Clause(query));
                    }
                }
                Ok(Clause::new(BooleanQuery::new(clauses)))
            }
        }
    }

    fn boolean(&self, clauses: Vec<(Occur, Clause)>) -> Clause {
        Clause::new(BooleanQuery::new(
            clauses
                .into_iter()
                .map(|(occur, clause)| (to_tantivy(occur), clause.into_query()))
                .collect(),
        ))
    }
}
