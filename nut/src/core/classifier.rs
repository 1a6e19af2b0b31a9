//! Incremental line classifier for the markup dialect spoken by the model.
//!
//! Each call classifies exactly one line (terminator already stripped) into one
//! [`ClassifiedLine`]. The only state carried between calls is whether a fenced
//! code block is open; inside a block no markup rule is evaluated, so headings,
//! markers or list syntax in code are never mistaken for structure.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::inline::Inline;

/// Opens and closes a code block.
pub const FENCE: &str = "```";

/// Language reported for a fence without an info string.
pub const UNSPECIFIED_LANGUAGE: &str = "unspecified";

static TODO_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^- \[([ x])\] (.+)$").expect("todo pattern is valid"));

static FILE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[file\]:\s*(\S.*)$").expect("file tag pattern is valid"));

/// Emphasis used to wrap a marker line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    /// `**text**`
    Strong,
    /// `***text***`
    StrongEmphasis,
}

/// A fenced code block, accumulated while its lines stream in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBlock {
    pub language: String,
    /// Every line of the block, each terminated by `\n`.
    pub content: String,
}

/// Result of classifying one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedLine {
    Heading { level: usize, text: String },
    ListItem { text: Inline },
    TodoItem { checked: bool, text: Inline },
    BlankLine,
    FileTag { path: String },
    /// A line wholly wrapped in emphasis; the model announces destination files this way.
    Marker { text: String, emphasis: Emphasis },
    CodeBlockStart { language: String },
    CodeBlockLine { content: String },
    CodeBlockEnd { block: CodeBlock },
    Paragraph { text: Inline },
}

impl ClassifiedLine {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heading { .. } => "heading",
            Self::ListItem { .. } => "list_item",
            Self::TodoItem { .. } => "todo_item",
            Self::BlankLine => "blank_line",
            Self::FileTag { .. } => "file_tag",
            Self::Marker { .. } => "marker",
            Self::CodeBlockStart { .. } => "code_block_start",
            Self::CodeBlockLine { .. } => "code_block_line",
            Self::CodeBlockEnd { .. } => "code_block_end",
            Self::Paragraph { .. } => "paragraph",
        }
    }

    /// Human-readable payload of the node, if it has one.
    pub fn text(&self) -> Option<String> {
        match self {
            Self::Heading { text, .. } | Self::Marker { text, .. } => Some(text.clone()),
            Self::ListItem { text } | Self::TodoItem { text, .. } | Self::Paragraph { text } => {
                Some(text.plain())
            }
            Self::FileTag { path } => Some(path.clone()),
            Self::CodeBlockStart { language } => Some(language.clone()),
            Self::CodeBlockLine { content } => Some(content.clone()),
            Self::BlankLine | Self::CodeBlockEnd { .. } => None,
        }
    }
}

/// Per-stream classifier state.
///
/// `Some` while a code block is open; the block accumulates its content until
/// the closing fence hands it out in [`ClassifiedLine::CodeBlockEnd`].
#[derive(Debug, Default)]
pub struct ParserState {
    open_block: Option<CodeBlock>,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_inside_code_block(&self) -> bool {
        self.open_block.is_some()
    }

    pub fn open_block(&self) -> Option<&CodeBlock> {
        self.open_block.as_ref()
    }
}

/// Classify one line, updating `state`. Total: every line yields exactly one node.
pub fn classify(line: &str, state: &mut ParserState) -> ClassifiedLine {
    if let Some(block) = state.open_block.as_mut() {
        if line.starts_with(FENCE) {
            let block = state.open_block.take().unwrap_or_default();
            return ClassifiedLine::CodeBlockEnd { block };
        }
        block.content.push_str(line);
        block.content.push('\n');
        return ClassifiedLine::CodeBlockLine {
            content: line.to_string(),
        };
    }

    if let Some(info) = line.strip_prefix(FENCE) {
        let language = match info.trim() {
            "" => UNSPECIFIED_LANGUAGE.to_string(),
            lang => lang.to_string(),
        };
        state.open_block = Some(CodeBlock {
            language: language.clone(),
            content: String::new(),
        });
        return ClassifiedLine::CodeBlockStart { language };
    }

    if line.starts_with('#') {
        let level = line.chars().take_while(|c| *c == '#').count();
        return ClassifiedLine::Heading {
            level,
            text: line[level..].trim().to_string(),
        };
    }

    if let Some(caps) = TODO_RE.captures(line) {
        let checked = caps[1].eq_ignore_ascii_case("x");
        return ClassifiedLine::TodoItem {
            checked,
            text: Inline::parse(caps[2].trim()),
        };
    }

    if let Some(rest) = line.strip_prefix("- ") {
        return ClassifiedLine::ListItem {
            text: Inline::parse(rest.trim()),
        };
    }

    if line.trim().is_empty() {
        return ClassifiedLine::BlankLine;
    }

    if let Some(caps) = FILE_TAG_RE.captures(line) {
        return ClassifiedLine::FileTag {
            path: caps[1].trim().to_string(),
        };
    }

    let trimmed = line.trim();
    if let Some(text) = wrapped(trimmed, "***") {
        return ClassifiedLine::Marker {
            text: text.to_string(),
            emphasis: Emphasis::StrongEmphasis,
        };
    }
    if let Some(text) = wrapped(trimmed, "**") {
        return ClassifiedLine::Marker {
            text: text.to_string(),
            emphasis: Emphasis::Strong,
        };
    }

    ClassifiedLine::Paragraph {
        text: Inline::parse(trimmed),
    }
}

/// Inner text of a line wrapped in `delimiter` on both sides and nothing else.
fn wrapped<'a>(line: &'a str, delimiter: &str) -> Option<&'a str> {
    let inner = line.strip_prefix(delimiter)?.strip_suffix(delimiter)?;
    let text = inner.trim();
    if text.is_empty() || inner.contains("**") {
        return None;
    }
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one(line: &str) -> ClassifiedLine {
        classify(line, &mut ParserState::new())
    }

    #[test]
    fn headings_count_leading_hashes() {
        assert_eq!(
            one("### Setup  "),
            ClassifiedLine::Heading {
                level: 3,
                text: "Setup".to_string()
            }
        );
        assert_eq!(
            one("#"),
            ClassifiedLine::Heading {
                level: 1,
                text: String::new()
            }
        );
    }

    #[test]
    fn todo_items_are_case_insensitive() {
        assert_eq!(
            one("- [X] ship it"),
            ClassifiedLine::TodoItem {
                checked: true,
                text: Inline::parse("ship it")
            }
        );
        assert_eq!(
            one("- [ ] write tests"),
            ClassifiedLine::TodoItem {
                checked: false,
                text: Inline::parse("write tests")
            }
        );
    }

    #[test]
    fn malformed_todo_falls_back_to_list_item() {
        assert_eq!(
            one("- [y] maybe"),
            ClassifiedLine::ListItem {
                text: Inline::parse("[y] maybe")
            }
        );
    }

    #[test]
    fn list_items_keep_inline_emphasis() {
        let node = one("- use **tokio**");
        let ClassifiedLine::ListItem { text } = node else {
            panic!("expected list item, got {node:?}");
        };
        assert!(text.has_strong());
        assert_eq!(text.plain(), "use tokio");
    }

    #[test]
    fn whitespace_only_is_blank() {
        assert_eq!(one(""), ClassifiedLine::BlankLine);
        assert_eq!(one(" \t "), ClassifiedLine::BlankLine);
    }

    #[test]
    fn file_tag_extracts_trimmed_path() {
        assert_eq!(
            one("[file]:   src/lib.rs  "),
            ClassifiedLine::FileTag {
                path: "src/lib.rs".to_string()
            }
        );
        assert!(matches!(one("[file]:   "), ClassifiedLine::Paragraph { .. }));
    }

    #[test]
    fn markers_accept_both_emphasis_forms() {
        assert_eq!(
            one("**a.js**"),
            ClassifiedLine::Marker {
                text: "a.js".to_string(),
                emphasis: Emphasis::Strong
            }
        );
        assert_eq!(
            one("  ***src/main.rs***  "),
            ClassifiedLine::Marker {
                text: "src/main.rs".to_string(),
                emphasis: Emphasis::StrongEmphasis
            }
        );
        assert_eq!(
            one("**notes**"),
            ClassifiedLine::Marker {
                text: "notes".to_string(),
                emphasis: Emphasis::Strong
            }
        );
    }

    #[test]
    fn partially_emphasized_line_is_paragraph() {
        let node = one("**a.js** is the entry point");
        let ClassifiedLine::Paragraph { text } = node else {
            panic!("expected paragraph, got {node:?}");
        };
        assert_eq!(text.plain(), "a.js is the entry point");
        assert!(matches!(one("**a** and **b**"), ClassifiedLine::Paragraph { .. }));
        assert!(matches!(one("****"), ClassifiedLine::Paragraph { .. }));
    }

    #[test]
    fn fence_opens_and_closes_block() {
        let mut state = ParserState::new();
        assert_eq!(
            classify("```rust", &mut state),
            ClassifiedLine::CodeBlockStart {
                language: "rust".to_string()
            }
        );
        assert!(state.is_inside_code_block());
        assert_eq!(
            classify("fn main() {}", &mut state),
            ClassifiedLine::CodeBlockLine {
                content: "fn main() {}".to_string()
            }
        );
        assert_eq!(
            classify("```", &mut state),
            ClassifiedLine::CodeBlockEnd {
                block: CodeBlock {
                    language: "rust".to_string(),
                    content: "fn main() {}\n".to_string(),
                }
            }
        );
        assert!(!state.is_inside_code_block());
    }

    #[test]
    fn bare_fence_language_is_unspecified() {
        assert_eq!(
            one("```   "),
            ClassifiedLine::CodeBlockStart {
                language: UNSPECIFIED_LANGUAGE.to_string()
            }
        );
    }

    #[test]
    fn markup_inside_code_is_verbatim() {
        let mut state = ParserState::new();
        classify("```md", &mut state);
        for line in ["# not a heading", "**a.js**", "- item", "[file]: x.rs", "", "  "] {
            assert_eq!(
                classify(line, &mut state),
                ClassifiedLine::CodeBlockLine {
                    content: line.to_string()
                },
                "line {line:?} must stay code"
            );
        }
        assert!(state.is_inside_code_block());
        assert_eq!(
            state.open_block().map(|block| block.content.as_str()),
            Some("# not a heading\n**a.js**\n- item\n[file]: x.rs\n\n  \n")
        );
    }

    #[test]
    fn indented_fence_is_not_a_fence() {
        assert!(matches!(one("  ```"), ClassifiedLine::Paragraph { .. }));
    }

    #[test]
    fn kind_and_text_describe_nodes() {
        let node = one("**a.js**");
        assert_eq!(node.kind(), "marker");
        assert_eq!(node.text().as_deref(), Some("a.js"));
        assert_eq!(one("").text(), None);
    }
}
