use std::ops::Range;

use regex::Regex;

use crate::predicate::{tokenize, TokenKind};

/// One `stream.channel` occurrence; `span` is its byte range in the text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamReference {
    pub stream: String,
    pub channel: String,
    pub span: Range<usize>,
}

impl StreamReference {
    pub fn text(&self) -> String {
        format!("{}.{}", self.stream, self.channel)
    }
}

/// Finds stream-qualified channel references in predicate text
pub trait ReferenceScanner: Send + Sync {
    /// Every occurrence, in text order
    fn scan(&self, text: &str) -> Vec<StreamReference>;
}

/// `identifier.identifier` bounded by whitespace
///
/// Text is padded with a space on each side, so references at either end
/// count. Adjacent references share their separating space.
#[derive(Debug, Clone)]
pub struct RegexReferenceScanner {
    pattern: Regex,
}

const REFERENCE_PATTERN: &str = r"\s(([a-zA-Z][a-zA-Z0-9_]*)\.([a-zA-Z][a-zA-Z0-9_]*))\s";

impl RegexReferenceScanner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(REFERENCE_PATTERN)?,
        })
    }
}

impl ReferenceScanner for RegexReferenceScanner {
    fn scan(&self, text: &str) -> Vec<StreamReference> {
        let padded = format!(" {} ", text);
        let mut found = Vec::new();
        let mut at = 0;
        while let Some(caps) = self.pattern.captures_at(&padded, at) {
            let (Some(whole), Some(stream), Some(channel), Some(outer)) =
                (caps.get(1), caps.get(2), caps.get(3), caps.get(0))
            else {
                break;
            };
            found.push(StreamReference {
                stream: stream.as_str().to_string(),
                channel: channel.as_str().to_string(),
                span: whole.start() - 1..whole.end() - 1,
            });
            // resume on the trailing separator so it can lead the next match
            at = outer.end() - 1;
        }
        found
    }
}

/// References as the predicate grammar sees them: `ident . ident`
///
/// Text that does not tokenize yields no references.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexerReferenceScanner;

impl ReferenceScanner for LexerReferenceScanner {
    fn scan(&self, text: &str) -> Vec<StreamReference> {
        let Ok(tokens) = tokenize(text) else {
            return Vec::new();
        };
        tokens
            .windows(3)
            .filter_map(|w| match (&w[0].kind, &w[1].kind, &w[2].kind) {
                (TokenKind::Ident(stream), TokenKind::Dot, TokenKind::Ident(channel)) => {
                    Some(StreamReference {
                        stream: stream.clone(),
                        channel: channel.clone(),
                        span: w[0].start..w[2].end,
                    })
                }
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(scanner: &dyn ReferenceScanner, text: &str) -> Vec<String> {
        scanner.scan(text).iter().map(|r| r.text()).collect()
    }

    #[test]
    fn test_regex_scanner_whitespace_bounded() {
        let scanner = RegexReferenceScanner::new().unwrap();
        assert_eq!(refs(&scanner, "door.open = 1"), vec!["door.open"]);
        assert_eq!(
            refs(&scanner, "temp > 3 AND door.open = 1 OR hall.lux > 2.5"),
            vec!["door.open", "hall.lux"]
        );
        assert!(refs(&scanner, "(door.open = 1)").is_empty());
        assert!(refs(&scanner, "temp > 1.5").is_empty());
    }

    #[test]
    fn test_regex_scanner_adjacent_references() {
        let scanner = RegexReferenceScanner::new().unwrap();
        assert_eq!(refs(&scanner, "a.b c.d"), vec!["a.b", "c.d"]);
    }

    #[test]
    fn test_regex_scanner_spans() {
        let scanner = RegexReferenceScanner::new().unwrap();
        let text = "x = 1 AND door.open = 1";
        let found = scanner.scan(text);
        assert_eq!(found.len(), 1);
        assert_eq!(&text[found[0].span.clone()], "door.open");
    }

    #[test]
    fn test_lexer_scanner_accepts_parenthesized() {
        let scanner = LexerReferenceScanner;
        let text = "(door.open = 1) AND temp > 1.5";
        let found = scanner.scan(text);
        assert_eq!(found.len(), 1);
        assert_eq!(&text[found[0].span.clone()], "door.open");
        assert!(scanner.scan("'unterminated").is_empty());
    }
}
