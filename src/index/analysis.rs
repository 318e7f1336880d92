//! Client-side text analysis.
//!
//! Analyzed fields are indexed from pre-tokenized text, and the query
//! compiler tokenizes filter values with the same analyzers, so both sides
//! always agree on terms and positions.

use crate::index::constants::MIN_NGRAM_SIZE;

/// A token with its position in the analyzed stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedToken {
    pub text: String,
    pub position: usize,
    pub offset_from: usize,
    pub offset_to: usize,
}

/// Analysis chains for the analyzed fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Analyzer {
    /// Whitespace split, lowercased (summary and message)
    Summary,
    /// Split on `/`, lowercased (event class and path details)
    Path,
    /// Split on `.` and `:` (IP address details)
    Ip,
    /// Whitespace split, lowercased, then fixed-size n-grams (identifiers and titles)
    Identifier,
}

impl Analyzer {
    pub fn tokens(&self, text: &str) -> Vec<AnalyzedToken> {
        match self {
            Analyzer::Summary => split_tokens(text, char::is_whitespace, true),
            Analyzer::Path => split_tokens(text, |c| c == '/', true),
            Analyzer::Ip => split_tokens(text, |c| c == '.' || c == ':', false),
            Analyzer::Identifier => ngram_tokens(text),
        }
    }

    /// Token texts only
    pub fn terms(&self, text: &str) -> Vec<String> {
        self.tokens(text).into_iter().map(|t| t.text).collect()
    }
}

fn split_tokens(
    text: &str,
    is_separator: impl Fn(char) -> bool,
    lowercase: bool,
) -> Vec<AnalyzedToken> {
    let mut tokens = Vec::new();
    let mut start: Option<usize> = None;

    let push = |from: usize, to: usize, tokens: &mut Vec<AnalyzedToken>| {
        let raw = &text[from..to];
        tokens.push(AnalyzedToken {
            text: if lowercase {
                raw.to_lowercase()
            } else {
                raw.to_string()
            },
            position: tokens.len(),
            offset_from: from,
            offset_to: to,
        });
    };

    for (idx, c) in text.char_indices() {
        if is_separator(c) {
            if let Some(from) = start.take() {
                push(from, idx, &mut tokens);
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(from) = start {
        push(from, text.len(), &mut tokens);
    }
    tokens
}

/// N-grams of every whitespace-separated word. Grams of one word take
/// consecutive positions; a position is skipped between words so phrases
/// never match across a word boundary.
fn ngram_tokens(text: &str) -> Vec<AnalyzedToken> {
    let mut grams = Vec::new();
    let mut position = 0;

    for word in split_tokens(text, char::is_whitespace, true) {
        let chars: Vec<(usize, char)> = word.text.char_indices().collect();
        if chars.len() < MIN_NGRAM_SIZE {
            continue;
        }
        for window in 0..=(chars.len() - MIN_NGRAM_SIZE) {
            let from = chars[window].0;
            let to = chars
                .get(window + MIN_NGRAM_SIZE)
                .map(|(idx, _)| *idx)
                .unwrap_or(word.text.len());
            grams.push(AnalyzedToken {
                text: word.text[from..to].to_string(),
                position,
                offset_from: word.offset_from,
                offset_to: word.offset_to,
            });
            position += 1;
        }
        position += 1;
    }
    grams
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_tokens() {
        let tokens = Analyzer::Summary.tokens("  Disk FULL on\t/var ");
        let terms: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(terms, vec!["disk", "full", "on", "/var"]);
        assert_eq!(tokens[3].position, 3);
        assert_eq!(tokens[0].offset_from, 2);
    }

    #[test]
    fn test_path_tokens() {
        assert_eq!(
            Analyzer::Path.terms("/Status/Ping/"),
            vec!["status".to_string(), "ping".to_string()]
        );
        assert!(Analyzer::Path.terms("/").is_empty());
    }

    #[test]
    fn test_ip_tokens_keep_case() {
        assert_eq!(Analyzer::Ip.terms("192.168.1.2"), vec!["192", "168", "1", "2"]);
        assert_eq!(Analyzer::Ip.terms("fe80:0:0:0:0:0:0:1"), vec![
            "fe80", "0", "0", "0", "0", "0", "0", "1"
        ]);
    }

    #[test]
    fn test_identifier_ngrams() {
        let grams = Analyzer::Identifier.tokens("Noss");
        let terms: Vec<&str> = grams.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(terms, vec!["nos", "oss"]);
        assert_eq!(grams[1].position, 1);
    }

    #[test]
    fn test_identifier_ngrams_skip_short_words() {
        let grams = Analyzer::Identifier.tokens("ab abcd");
        let terms: Vec<&str> = grams.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(terms, vec!["abc", "bcd"]);
    }

    #[test]
    fn test_identifier_word_gap() {
        let grams = Analyzer::Identifier.tokens("abc def");
        assert_eq!(grams[0].position, 0);
        assert_eq!(grams[1].position, 2);
    }
}
