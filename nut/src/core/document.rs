//! Whole-document view over classified lines.
//!
//! The streaming path never needs this; `nut replay` uses it to summarize a
//! recorded response.

use crate::core::classifier::{ClassifiedLine, CodeBlock, ParserState, classify};

/// A top-level block of a classified document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    /// Consecutive list and todo items.
    List(Vec<ClassifiedLine>),
    Code(CodeBlock),
    /// A code block the document never closed.
    UnterminatedCode(CodeBlock),
    Line(ClassifiedLine),
}

/// Classify every line of `text` and group lists and code blocks.
///
/// Blank lines end a list and are otherwise dropped.
pub fn parse_document(text: &str) -> Vec<Block> {
    let mut state = ParserState::new();
    let mut blocks = Vec::new();
    let mut list: Vec<ClassifiedLine> = Vec::new();

    for line in text.lines() {
        let node = classify(line, &mut state);
        if matches!(
            node,
            ClassifiedLine::ListItem { .. } | ClassifiedLine::TodoItem { .. }
        ) {
            list.push(node);
            continue;
        }
        if !list.is_empty() {
            blocks.push(Block::List(std::mem::take(&mut list)));
        }
        match node {
            ClassifiedLine::CodeBlockEnd { block } => blocks.push(Block::Code(block)),
            ClassifiedLine::BlankLine
            | ClassifiedLine::CodeBlockStart { .. }
            | ClassifiedLine::CodeBlockLine { .. } => {}
            other => blocks.push(Block::Line(other)),
        }
    }

    if !list.is_empty() {
        blocks.push(Block::List(list));
    }
    if let Some(block) = state.open_block() {
        blocks.push(Block::UnterminatedCode(block.clone()));
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inline::Inline;

    #[test]
    fn groups_lists_and_code() {
        let doc = "# Plan\n- [x] one\n- two\n\nText\n```sh\necho hi\n```\n";
        let blocks = parse_document(doc);
        assert_eq!(
            blocks,
            vec![
                Block::Line(ClassifiedLine::Heading {
                    level: 1,
                    text: "Plan".to_string()
                }),
                Block::List(vec![
                    ClassifiedLine::TodoItem {
                        checked: true,
                        text: Inline::parse("one")
                    },
                    ClassifiedLine::ListItem {
                        text: Inline::parse("two")
                    },
                ]),
                Block::Line(ClassifiedLine::Paragraph {
                    text: Inline::parse("Text")
                }),
                Block::Code(CodeBlock {
                    language: "sh".to_string(),
                    content: "echo hi\n".to_string()
                }),
            ]
        );
    }

    #[test]
    fn reports_unterminated_code() {
        let blocks = parse_document("```\nlet x = 1;\n");
        assert_eq!(
            blocks,
            vec![Block::UnterminatedCode(CodeBlock {
                language: "unspecified".to_string(),
                content: "let x = 1;\n".to_string()
            })]
        );
    }
}
