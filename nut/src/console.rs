//! Textual progress feedback while a response streams in.

use std::io::Write;

use tracing::warn;

use crate::core::classifier::ClassifiedLine;
use crate::core::destination::announced_destination;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConsoleMode {
    /// Prose as text, one `.` per code line, `done` after each block.
    #[default]
    Chat,
    /// Raw line followed by the node kind and payload.
    Verbose,
}

/// Console text for one node, if it prints anything.
pub fn render(node: &ClassifiedLine, raw: &str, mode: ConsoleMode) -> Option<String> {
    if mode == ConsoleMode::Verbose {
        let text = node.text().unwrap_or_default();
        return Some(format!("{raw}\n{}\t{text}\n", node.kind()));
    }

    if let Some(path) = announced_destination(node) {
        return Some(format!("{path} "));
    }
    match node {
        ClassifiedLine::CodeBlockLine { .. } => Some(".".to_string()),
        ClassifiedLine::CodeBlockEnd { .. } => Some("done\n".to_string()),
        ClassifiedLine::BlankLine | ClassifiedLine::CodeBlockStart { .. } => None,
        ClassifiedLine::Heading { .. }
        | ClassifiedLine::ListItem { .. }
        | ClassifiedLine::TodoItem { .. }
        | ClassifiedLine::FileTag { .. }
        | ClassifiedLine::Marker { .. }
        | ClassifiedLine::Paragraph { .. } => node.text().map(|text| format!("{text}\n")),
    }
}

/// Observer that writes [`render`]ed nodes to a writer.
#[derive(Debug)]
pub struct Console<W: Write> {
    out: W,
    mode: ConsoleMode,
}

impl<W: Write> Console<W> {
    pub fn new(out: W, mode: ConsoleMode) -> Self {
        Self { out, mode }
    }

    pub fn set_mode(&mut self, mode: ConsoleMode) {
        self.mode = mode;
    }

    pub fn observe(&mut self, node: &ClassifiedLine, raw: &str) {
        if let Some(text) = render(node, raw, self.mode) {
            self.print(&text);
        }
    }

    /// Write a free-form message.
    pub fn print(&mut self, text: &str) {
        if let Err(err) = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush()) {
            warn!(err = %err, "console write failed");
        }
    }

    pub fn println(&mut self, text: &str) {
        self.print(&format!("{text}\n"));
    }
}
