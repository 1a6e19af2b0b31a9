//! Inline `**strong**` runs inside list items and paragraphs.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static STRONG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("strong pattern is valid"));

/// One run of inline text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Text(String),
    Strong(String),
}

/// Text with its emphasis runs recognized.
///
/// Emphasis never changes the top-level kind of a line; it is only annotated
/// here so observers can render it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inline {
    spans: Vec<Span>,
}

impl Inline {
    pub fn parse(text: &str) -> Self {
        let mut spans = Vec::new();
        let mut cursor = 0;
        for caps in STRONG_RE.captures_iter(text) {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > cursor {
                spans.push(Span::Text(text[cursor..whole.start()].to_string()));
            }
            spans.push(Span::Strong(inner.as_str().to_string()));
            cursor = whole.end();
        }
        if cursor < text.len() {
            spans.push(Span::Text(text[cursor..].to_string()));
        }
        Self { spans }
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    pub fn has_strong(&self) -> bool {
        self.spans.iter().any(|span| matches!(span, Span::Strong(_)))
    }

    /// Text with the emphasis delimiters removed.
    pub fn plain(&self) -> String {
        self.spans
            .iter()
            .map(|span| match span {
                Span::Text(text) | Span::Strong(text) => text.as_str(),
            })
            .collect()
    }
}

impl fmt::Display for Inline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.plain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_single_span() {
        let inline = Inline::parse("just words");
        assert_eq!(inline.spans(), &[Span::Text("just words".to_string())]);
        assert!(!inline.has_strong());
    }

    #[test]
    fn strong_runs_are_split_out() {
        let inline = Inline::parse("use **cargo** and **rustc** here");
        assert_eq!(
            inline.spans(),
            &[
                Span::Text("use ".to_string()),
                Span::Strong("cargo".to_string()),
                Span::Text(" and ".to_string()),
                Span::Strong("rustc".to_string()),
                Span::Text(" here".to_string()),
            ]
        );
        assert_eq!(inline.plain(), "use cargo and rustc here");
    }

    #[test]
    fn unmatched_delimiters_stay_literal() {
        let inline = Inline::parse("a ** b");
        assert_eq!(inline.plain(), "a ** b");
        assert!(!inline.has_strong());
    }

    #[test]
    fn empty_text_has_no_spans() {
        assert!(Inline::parse("").spans().is_empty());
    }
}
