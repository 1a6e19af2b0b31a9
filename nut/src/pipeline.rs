//! Fragment → line → node → destination, for one response stream.
//!
//! [`Pipeline`] owns the reassembly buffer, the classifier state and the
//! router for a single task. It is synchronous; the driver awaits fragments
//! and pushes them through one at a time, and `replay` pushes a recorded
//! response the same way.

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::classifier::{ClassifiedLine, CodeBlock, ParserState, classify};
use crate::core::reassembler::LineReassembler;
use crate::io::router::{FileRouter, RouteNotice, RouteSummary};

/// What a finished stream produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Number of classified lines.
    pub lines: usize,
    pub route: RouteSummary,
    /// Text after the last newline, never classified.
    pub discarded_tail: Option<String>,
    /// Block still open when the stream ended.
    pub unterminated: Option<CodeBlock>,
}

pub struct Pipeline {
    reassembler: LineReassembler,
    state: ParserState,
    router: FileRouter,
    lines: usize,
}

impl Pipeline {
    pub fn new(router: FileRouter) -> Self {
        Self {
            reassembler: LineReassembler::new(),
            state: ParserState::new(),
            router,
            lines: 0,
        }
    }

    /// Feed one fragment. Every completed line is classified, handed to
    /// `observer` with its raw text, then routed, in stream order.
    ///
    /// Returns the routing notices raised by this fragment. A routing error
    /// stops processing of the remaining lines.
    pub fn push<F>(&mut self, fragment: &str, observer: &mut F) -> Result<Vec<RouteNotice>>
    where
        F: FnMut(&ClassifiedLine, &str),
    {
        let mut notices = Vec::new();
        for line in self.reassembler.feed(fragment) {
            let node = classify(&line, &mut self.state);
            self.lines += 1;
            observer(&node, &line);
            if let Some(notice) = self.router.route(&node)? {
                notices.push(notice);
            }
        }
        Ok(notices)
    }

    /// End of stream: discard the partial tail and close any open sink.
    pub fn finish(self) -> Result<PipelineOutcome> {
        let discarded_tail = self.reassembler.finish();
        if let Some(tail) = &discarded_tail {
            debug!(bytes = tail.len(), "discarding partial trailing line");
        }
        let unterminated = self.state.open_block().cloned();
        if let Some(block) = &unterminated {
            warn!(
                language = %block.language,
                path = ?self.router.current_path(),
                "stream ended inside a code block"
            );
        }
        let route = self.router.finish()?;
        Ok(PipelineOutcome {
            lines: self.lines,
            route,
            discarded_tail,
            unterminated,
        })
    }
}
