//! Re-run a recorded response through the pipeline without writing files.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};

use crate::core::classifier::ClassifiedLine;
use crate::core::document::{Block, parse_document};
use crate::core::inline::Span;
use crate::io::router::{FileRouter, OpenMode, RoutePolicy, Sink, SinkOpener};
use crate::io::transcript::strip_annotations;
use crate::pipeline::{Pipeline, PipelineOutcome};

const RESPONSE_HEADING: &str = "## Response\n";

type SharedOut = Arc<Mutex<Box<dyn Write + Send>>>;

/// Opener that prints `path\t >> line` for every routed line.
#[derive(Clone)]
pub struct DryRunOpener {
    out: SharedOut,
}

impl DryRunOpener {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(out))),
        }
    }
}

impl SinkOpener for DryRunOpener {
    fn open(&mut self, path: &Path, _mode: OpenMode) -> Result<Sink> {
        Ok(Sink::new(
            path,
            PrefixWriter {
                path: path.to_path_buf(),
                out: Arc::clone(&self.out),
                at_line_start: true,
            },
        ))
    }
}

struct PrefixWriter {
    path: PathBuf,
    out: SharedOut,
    at_line_start: bool,
}

impl Write for PrefixWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| io::Error::other("replay output lock poisoned"))?;
        for chunk in buf.split_inclusive(|byte| *byte == b'\n') {
            if self.at_line_start {
                write!(out, "{}\t >> ", self.path.display())?;
            }
            out.write_all(chunk)?;
            self.at_line_start = chunk.ends_with(b"\n");
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out
            .lock()
            .map_err(|_| io::Error::other("replay output lock poisoned"))?
            .flush()
    }
}

/// Structural counts from the whole-document view.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSummary {
    pub code_blocks: usize,
    pub unterminated_blocks: usize,
    pub lists: usize,
    pub other: usize,
}

impl DocumentSummary {
    pub fn from_blocks(blocks: &[Block]) -> Self {
        let mut summary = Self::default();
        for block in blocks {
            match block {
                Block::Code(_) => summary.code_blocks += 1,
                Block::UnterminatedCode(_) => summary.unterminated_blocks += 1,
                Block::List(_) => summary.lists += 1,
                Block::Line(_) => summary.other += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySummary {
    pub outcome: PipelineOutcome,
    pub document: DocumentSummary,
}

/// The response part of a transcript, with routing annotations removed.
///
/// Text without a `## Response` heading is taken verbatim as a bare response.
pub fn response_text(recorded: &str) -> String {
    match recorded.rfind(RESPONSE_HEADING) {
        Some(start) => strip_annotations(&recorded[start + RESPONSE_HEADING.len()..]),
        None => recorded.to_string(),
    }
}

/// Replay `recorded` as a single fragment.
///
/// With `nodes`, prints `kind\ttext` per classified line instead of the
/// routed lines.
pub fn replay(
    recorded: &str,
    nodes: bool,
    out: impl Write + Send + 'static,
) -> Result<ReplaySummary> {
    let text = response_text(recorded);

    let outcome = if nodes {
        let mut out = out;
        let mut write_error = None;
        let mut pipeline = Pipeline::new(FileRouter::new(Discard, RoutePolicy::default()));
        pipeline.push(&text, &mut |node, _raw| {
            if write_error.is_none()
                && let Err(err) = writeln!(out, "{}", node_line(node))
            {
                write_error = Some(err);
            }
        })?;
        if let Some(err) = write_error {
            return Err(err).context("write replay output");
        }
        out.flush().context("flush replay output")?;
        pipeline.finish()?
    } else {
        let mut pipeline = Pipeline::new(FileRouter::new(
            DryRunOpener::new(out),
            RoutePolicy::default(),
        ));
        pipeline.push(&text, &mut |_, _| {})?;
        pipeline.finish()?
    };

    Ok(ReplaySummary {
        outcome,
        document: DocumentSummary::from_blocks(&parse_document(&text)),
    })
}

/// `kind\ttext`, plus a `strong:` column when the text has emphasis runs.
fn node_line(node: &ClassifiedLine) -> String {
    let mut line = format!("{}\t{}", node.kind(), node.text().unwrap_or_default());
    if let ClassifiedLine::ListItem { text }
    | ClassifiedLine::TodoItem { text, .. }
    | ClassifiedLine::Paragraph { text } = node
        && text.has_strong()
    {
        let strong = text
            .spans()
            .iter()
            .filter_map(|span| match span {
                Span::Strong(run) => Some(run.as_str()),
                Span::Text(_) => None,
            })
            .collect::<Vec<_>>();
        line.push_str(&format!("\tstrong: {}", strong.join(", ")));
    }
    line
}

/// Swallows routed lines in `--nodes` mode.
struct Discard;

impl SinkOpener for Discard {
    fn open(&mut self, path: &Path, _mode: OpenMode) -> Result<Sink> {
        Ok(Sink::new(path, io::sink()))
    }
}
