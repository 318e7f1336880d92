//! Lucene query-string rendering of compiled filters

use crate::error::{IndexError, Result};
use crate::index::analysis::AnalyzedToken;
use crate::index::query::text::has_wildcard;
use crate::index::query::{ClauseFactory, Occur};
use crate::models::{EventDetailItem, EventDetailType};

/// Prefix of every detail field in the remote collection
pub const DETAIL_FIELD_PREFIX: &str = "details.";

pub const MATCH_ALL: &str = "*:*";

const SPECIAL: &str = "+-&|!(){}[]^\"~:\\/*?";
const SPECIAL_EXCEPT_WILDCARDS: &str = "+-&|!(){}[]^\"~:\\/";

/// Remote field holding a configured detail; the suffix selects the
/// collection's dynamic field type
pub fn remote_detail_field(item: &EventDetailItem) -> String {
    let suffix = match item.detail_type {
        EventDetailType::String => "_s",
        EventDetailType::Integer => "_i",
        EventDetailType::Float => "_f",
        EventDetailType::Long => "_l",
        EventDetailType::Double => "_d",
        EventDetailType::IpAddress => "_ip",
        EventDetailType::Path => "_path",
    };
    format!("{}{}{}", DETAIL_FIELD_PREFIX, item.key, suffix)
}

/// Backslash-escape query syntax; values with whitespace (or empty ones)
/// are quoted
fn escape_with(value: &str, special: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut whitespace = false;
    for c in value.chars() {
        whitespace |= c.is_whitespace();
        if special.contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    if whitespace || out.is_empty() {
        format!("\"{}\"", out)
    } else {
        out
    }
}

pub fn escape(value: &str) -> String {
    escape_with(value, SPECIAL)
}

fn escape_pattern(value: &str) -> String {
    escape_with(value, SPECIAL_EXCEPT_WILDCARDS)
}

fn bound<T: ToString>(value: Option<T>) -> String {
    value.map(|v| escape(&v.to_string())).unwrap_or_else(|| "*".to_string())
}

/// Builds query strings; stateless, so one instance serves every search
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoteClauses {
    max_clause_count: usize,
}

impl RemoteClauses {
    pub fn new(max_clause_count: usize) -> Self {
        Self { max_clause_count }
    }
}

impl ClauseFactory for RemoteClauses {
    type Clause = String;

    fn detail_field(&self, item: &EventDetailItem) -> String {
        remote_detail_field(item)
    }

    fn match_all(&self) -> String {
        MATCH_ALL.to_string()
    }

    fn term(&self, field: &str, value: &str) -> Result<String> {
        Ok(format!("{}:{}", field, escape(value)))
    }

    fn terms(&self, field: &str, values: &[String]) -> Result<String> {
        match values {
            [] => Err(IndexError::InvalidArgument(format!("No terms for {}", field))),
            [value] => self.term(field, value),
            _ if values.len() > self.max_clause_count => Err(IndexError::InvalidArgument(
                format!("Too many clauses for {}", field),
            )),
            _ => {
                let escaped: Vec<String> = values.iter().map(|v| escape(v)).collect();
                Ok(format!("{}:({})", field, escaped.join(" OR ")))
            }
        }
    }

    fn prefix(&self, field: &str, prefix: &str) -> Result<String> {
        Ok(format!("{}:{}*", field, escape(prefix)))
    }

    fn wildcard(&self, field: &str, pattern: &str) -> Result<String> {
        if !has_wildcard(pattern) {
            return self.term(field, pattern);
        }
        Ok(format!("{}:{}", field, escape_pattern(pattern)))
    }

    fn long_range(&self, field: &str, from: Option<i64>, to: Option<i64>) -> Result<String> {
        if from.is_none() && to.is_none() {
            return Ok(self.match_all());
        }
        Ok(format!("{}:[{} TO {}]", field, bound(from), bound(to)))
    }

    fn double_range(&self, field: &str, from: Option<f64>, to: Option<f64>) -> Result<String> {
        if from.is_none() && to.is_none() {
            return Ok(self.match_all());
        }
        Ok(format!("{}:[{} TO {}]", field, bound(from), bound(to)))
    }

    fn string_range(&self, field: &str, from: &str, to: &str) -> Result<String> {
        Ok(format!("{}:[{} TO {}]", field, escape(from), escape(to)))
    }

    /// The collection runs its own n-gram analyzer on the raw value
    fn ngram_phrase(&self, field: &str, value: &str, _grams: &[AnalyzedToken]) -> Result<String> {
        self.term(field, value)
    }

    fn wildcard_phrase(&self, field: &str, tokens: &[String]) -> Result<String> {
        if tokens.is_empty() {
            return Err(IndexError::InvalidArgument("Empty phrase".to_string()));
        }
        let phrase: Vec<String> = tokens
            .iter()
            .map(|t| escape_with(t, SPECIAL_EXCEPT_WILDCARDS))
            .collect();
        let inner = format!("{}:\"{}\"", field, phrase.join(" "));
        Ok(format!(
            "_query_:\"{{!complexphrase}}{}\"",
            inner.replace('\\', "\\\\").replace('"', "\\\"")
        ))
    }

    fn boolean(&self, clauses: Vec<(Occur, String)>) -> String {
        // A purely negative group matches nothing on its own
        let negative_only = clauses.iter().all(|(occur, _)| *occur == Occur::MustNot);
        let mut parts: Vec<String> = Vec::with_capacity(clauses.len() + 1);
        if negative_only {
            parts.push(format!("+{}", MATCH_ALL));
        }
        parts.extend(clauses.into_iter().map(|(occur, clause)| match occur {
            Occur::Must => format!("+({})", clause),
            Occur::Should => format!("({})", clause),
            Occur::MustNot => format!("-({})", clause),
        }));
        format!("({})", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::query::QueryCompiler;
    use crate::models::{EventFilter, EventSeverity, FilterOperator, IndexedDetails};

    fn factory() -> RemoteClauses {
        RemoteClauses::new(1024)
    }

    #[test]
    fn test_escape() {
        assert_eq!(escape("a:b"), r"a\:b");
        assert_eq!(escape("two words"), "\"two words\"");
        assert_eq!(escape(""), "\"\"");
        assert_eq!(escape_pattern("web*01?"), "web*01?");
        assert_eq!(escape_pattern("/a/b*"), r"\/a\/b*");
    }

    #[test]
    fn test_detail_field_suffixes() {
        let item = EventDetailItem::new("zenoss.device.ip", EventDetailType::IpAddress);
        assert_eq!(remote_detail_field(&item), "details.zenoss.device.ip_ip");
        let item = EventDetailItem::new("prio", EventDetailType::Integer);
        assert_eq!(remote_detail_field(&item), "details.prio_i");
    }

    #[test]
    fn test_ranges_and_terms() {
        let f = factory();
        assert_eq!(f.long_range("count", Some(1), None).unwrap(), "count:[1 TO *]");
        assert_eq!(f.long_range("count", None, None).unwrap(), MATCH_ALL);
        assert_eq!(
            f.terms("tag", &["a".to_string(), "b c".to_string()]).unwrap(),
            "tag:(a OR \"b c\")"
        );
        assert_eq!(f.prefix("event_class_not_analyzed", "/app/").unwrap(), r"event_class_not_analyzed:\/app\/*");
    }

    #[test]
    fn test_negative_only_group_matches_all_first() {
        let f = factory();
        let query = f.boolean(vec![(Occur::MustNot, "severity:[0 TO 0]".to_string())]);
        assert_eq!(query, "(+*:* -(severity:[0 TO 0]))");
    }

    #[test]
    fn test_complex_phrase() {
        let f = factory();
        let query = f
            .wildcard_phrase("summary", &["disk".to_string(), "ful*".to_string()])
            .unwrap();
        assert_eq!(query, r#"_query_:"{!complexphrase}summary:\"disk ful*\"""#);
    }

    #[test]
    fn test_compiled_filter_renders() {
        let details = IndexedDetails::default();
        let filter = EventFilter::new()
            .with_severity([EventSeverity::Critical, EventSeverity::Error])
            .with_tags(FilterOperator::Or, vec!["group-a".to_string()]);
        let query = QueryCompiler::new(&factory(), &details)
            .compile(Some(&filter), None)
            .unwrap();
        assert!(query.contains("severity:[4 TO 5]"), "{}", query);
        assert!(query.contains("tag:group\\-a"), "{}", query);
    }
}
