//! Inclusive ranges and their coalescing

use crate::error::{IndexError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A bound type that can appear in a coalesced range
pub trait RangeBound: Copy + PartialOrd + fmt::Debug {
    /// Whether `next` directly follows `prev` with no value in between
    fn is_successor(prev: Self, next: Self) -> bool;
}

impl RangeBound for i64 {
    fn is_successor(prev: Self, next: Self) -> bool {
        prev.checked_add(1) == Some(next)
    }
}

impl RangeBound for f64 {
    fn is_successor(_prev: Self, _next: Self) -> bool {
        false
    }
}

/// Inclusive range; `None` is unbounded on that side
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    pub from: Option<T>,
    pub to: Option<T>,
}

impl<T: RangeBound> Range<T> {
    pub fn new(from: Option<T>, to: Option<T>) -> Result<Self> {
        if let (Some(f), Some(t)) = (from, to) {
            if f > t {
                return Err(IndexError::InvalidArgument(format!(
                    "inverted range ({:?}-{:?})",
                    f, t
                )));
            }
        }
        Ok(Self { from, to })
    }

    pub fn exact(value: T) -> Self {
        Self {
            from: Some(value),
            to: Some(value),
        }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, value: T) -> bool {
        self.from.map_or(true, |f| f <= value) && self.to.map_or(true, |t| value <= t)
    }

    /// Open `from` sorts first; for equal `from`, an open `to` sorts last
    pub fn compare(&self, other: &Self) -> Ordering {
        let by_from = match (self.from, other.from) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        };
        by_from.then_with(|| match (self.to, other.to) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        })
    }

    /// Union of two overlapping or adjacent ranges, `None` when disjoint
    pub fn merge(&self, other: &Self) -> Option<Self> {
        if let (Some(to), Some(from)) = (self.to, other.from) {
            if to < from {
                return T::is_successor(to, from).then(|| Self {
                    from: self.from,
                    to: other.to,
                });
            }
        }
        if let (Some(to), Some(from)) = (other.to, self.from) {
            if to < from {
                return T::is_successor(to, from).then(|| Self {
                    from: other.from,
                    to: self.to,
                });
            }
        }
        let from = match (self.from, other.from) {
            (Some(a), Some(b)) => Some(if a <= b { a } else { b }),
            _ => None,
        };
        let to = match (self.to, other.to) {
            (Some(a), Some(b)) => Some(if a >= b { a } else { b }),
            _ => None,
        };
        Some(Self { from, to })
    }
}

/// Sort ranges and merge every overlapping or adjacent run
pub fn coalesce<T: RangeBound>(mut ranges: Vec<Range<T>>) -> Vec<Range<T>> {
    ranges.sort_by(|a, b| a.compare(b));
    let mut merged: Vec<Range<T>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last().and_then(|last| last.merge(&range)) {
            Some(union) => {
                if let Some(last) = merged.last_mut() {
                    *last = union;
                }
            }
            None => merged.push(range),
        }
    }
    merged
}

/// Collapse enum ordinals into runs of consecutive values
pub fn coalesce_ordinals(mut ordinals: Vec<i64>) -> Vec<Range<i64>> {
    ordinals.sort_unstable();
    ordinals.dedup();
    coalesce(ordinals.into_iter().map(Range::exact).collect())
}

/// Parse a numeric detail filter value.
///
/// `"a:b"` is an inclusive range, `"a"` an exact value; either side of the
/// colon may be empty for an unbounded end.
pub fn parse_numeric_value<T>(value: &str) -> Result<Range<T>>
where
    T: RangeBound + FromStr,
{
    if value.is_empty() {
        return Err(IndexError::InvalidArgument("Empty numeric value".into()));
    }
    let (left, right) = match value.split_once(':') {
        Some((left, right)) => (left, right),
        None => (value, value),
    };
    Range::new(parse_bound(left)?, parse_bound(right)?)
}

fn parse_bound<T: FromStr>(value: &str) -> Result<Option<T>> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<T>()
        .map(Some)
        .map_err(|_| IndexError::InvalidArgument(format!("Invalid numeric value: {}", value)))
}
