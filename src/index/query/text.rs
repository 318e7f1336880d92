//! String helpers for filter values

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_ZEROS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0+(.*)$").expect("valid leading zeros pattern"));

/// Strip one pair of enclosing double quotes
pub fn unquote(value: &str) -> &str {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Whether a value carries `*` or `?` wildcards
pub fn has_wildcard(value: &str) -> bool {
    value.contains('*') || value.contains('?')
}

/// Drop the leading zeros of one address segment.
///
/// A run of zeros collapses to `"0"`; a single zero is kept when the
/// remainder does not start with a hex digit (`"0*"` stays `"0*"`).
pub fn remove_leading_zeros(original: &str) -> String {
    let Some(captures) = LEADING_ZEROS.captures(original) else {
        return original.to_string();
    };
    let remaining = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    match remaining.chars().next() {
        None => "0".to_string(),
        Some(first) if first.to_ascii_lowercase().is_ascii_hexdigit() => remaining.to_string(),
        Some(_) => format!("0{}", remaining),
    }
}

/// Split on a separator, trimming tokens and dropping empty ones
pub fn tokenize(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unquote() {
        assert_eq!(unquote("\"abc\""), "abc");
        assert_eq!(unquote("\"\""), "");
        assert_eq!(unquote("\""), "\"");
        assert_eq!(unquote("abc\""), "abc\"");
    }

    #[test]
    fn test_remove_leading_zeros() {
        assert_eq!(remove_leading_zeros("000"), "0");
        assert_eq!(remove_leading_zeros("001"), "1");
        assert_eq!(remove_leading_zeros("00a"), "a");
        assert_eq!(remove_leading_zeros("00*"), "0*");
        assert_eq!(remove_leading_zeros("10"), "10");
        assert_eq!(remove_leading_zeros("*"), "*");
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(tokenize("192..168.", '.'), vec!["192", "168"]);
        assert!(tokenize(":", ':').is_empty());
    }
}
