//! Routes code-block lines into the files the stream announces.
//!
//! The router owns at most one open [`Sink`]. A marker or file tag naming a
//! file supersedes the previous sink (closing it), a closing fence only stops
//! writing, and [`FileRouter::finish`] closes whatever is still open. Every
//! sink is therefore closed exactly once; a sink dropped on an error path is
//! flushed by its `Drop`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::classifier::ClassifiedLine;
use crate::core::destination::announced_destination;

/// How a destination is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Truncate,
    Append,
}

/// What happens when a task announces a destination it already wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatPolicy {
    /// Reopen and truncate on every announcement.
    #[default]
    Truncate,
    /// Truncate on the first announcement in a task, append afterwards.
    Append,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoutePolicy {
    pub repeat: RepeatPolicy,
    /// Leave destinations that existed before the task untouched.
    pub skip_existing: bool,
}

/// An open, append-only destination for code lines.
pub struct Sink {
    path: PathBuf,
    writer: Option<Box<dyn Write>>,
    lines: usize,
}

impl Sink {
    pub fn new(path: impl Into<PathBuf>, writer: impl Write + 'static) -> Self {
        Self {
            path: path.into(),
            writer: Some(Box::new(writer)),
            lines: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&mut self, content: &str) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("sink {} is closed", self.path.display()))?;
        writer
            .write_all(content.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
            .with_context(|| format!("write {}", self.path.display()))?;
        self.lines += 1;
        Ok(())
    }

    /// Flush and release the underlying handle.
    pub fn close(mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .with_context(|| format!("flush {}", self.path.display()))?;
        }
        debug!(path = %self.path.display(), lines = self.lines, "sink closed");
        Ok(())
    }
}

impl Drop for Sink {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take()
            && let Err(err) = writer.flush()
        {
            warn!(path = %self.path.display(), err = %err, "failed to flush sink on drop");
        }
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("path", &self.path)
            .field("open", &self.writer.is_some())
            .field("lines", &self.lines)
            .finish()
    }
}

/// Opens sinks for announced destinations.
pub trait SinkOpener {
    fn open(&mut self, path: &Path, mode: OpenMode) -> Result<Sink>;

    /// Whether the destination already exists (consulted for skip-existing).
    fn exists(&self, _path: &Path) -> bool {
        false
    }
}

/// Writes destinations as files below an output root.
#[derive(Debug, Clone)]
pub struct FsOpener {
    root: PathBuf,
}

impl FsOpener {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Join `path` onto the root, refusing paths that would leave it.
    ///
    /// A leading `/` (or drive prefix) is read as relative to the root.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in path.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::ParentDir if depth > 0 => {
                    resolved.pop();
                    depth -= 1;
                }
                Component::ParentDir => {
                    bail!("destination {} escapes the output root", path.display())
                }
                Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            }
        }
        Ok(resolved)
    }
}

impl SinkOpener for FsOpener {
    fn open(&mut self, path: &Path, mode: OpenMode) -> Result<Sink> {
        let resolved = self.resolve(path)?;
        if let Some(parent) = resolved.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create destination dir {}", parent.display()))?;
        }
        let file = match mode {
            OpenMode::Truncate => File::create(&resolved),
            OpenMode::Append => OpenOptions::new().create(true).append(true).open(&resolved),
        }
        .with_context(|| format!("open destination {}", resolved.display()))?;
        Ok(Sink::new(resolved, BufWriter::new(file)))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_ok_and(|resolved| resolved.exists())
    }
}

/// Sends every destination to standard output.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutOpener;

impl SinkOpener for StdoutOpener {
    fn open(&mut self, path: &Path, _mode: OpenMode) -> Result<Sink> {
        Ok(Sink::new(path, io::stdout()))
    }
}

/// Why a code line was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// No destination was active.
    NoDestination,
    /// The active destination existed before the task and is being skipped.
    SkippedDestination,
}

/// Diagnostic produced while routing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteNotice {
    Opened { path: PathBuf },
    /// The announced destination is already open and keeps its handle.
    Resumed { path: PathBuf },
    SkippedExisting { path: PathBuf },
    Dropped { content: String, reason: DropReason },
}

/// What a finished router wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteSummary {
    /// Destinations opened, in first-open order.
    pub files: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub lines_written: usize,
    pub lines_dropped: usize,
}

/// Per-task routing state.
pub struct FileRouter {
    opener: Box<dyn SinkOpener>,
    policy: RoutePolicy,
    current_path: Option<PathBuf>,
    sink: Option<Sink>,
    /// Code lines go to `sink` only while set; a closing fence clears it.
    writing: bool,
    skipping: bool,
    opened: Vec<PathBuf>,
    summary: RouteSummary,
}

impl FileRouter {
    pub fn new(opener: impl SinkOpener + 'static, policy: RoutePolicy) -> Self {
        Self {
            opener: Box::new(opener),
            policy,
            current_path: None,
            sink: None,
            writing: false,
            skipping: false,
            opened: Vec::new(),
            summary: RouteSummary::default(),
        }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn has_open_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Apply one classified line. Errors are filesystem failures and are fatal
    /// to the task.
    pub fn route(&mut self, node: &ClassifiedLine) -> Result<Option<RouteNotice>> {
        match node {
            ClassifiedLine::Marker { .. } | ClassifiedLine::FileTag { .. } => {
                match announced_destination(node) {
                    Some(candidate) => self.switch_to(Path::new(candidate)).map(Some),
                    None => Ok(None),
                }
            }
            ClassifiedLine::CodeBlockLine { content } => self.write(content),
            ClassifiedLine::CodeBlockEnd { .. } => {
                self.writing = false;
                self.skipping = false;
                Ok(None)
            }
            ClassifiedLine::Heading { .. }
            | ClassifiedLine::ListItem { .. }
            | ClassifiedLine::TodoItem { .. }
            | ClassifiedLine::BlankLine
            | ClassifiedLine::CodeBlockStart { .. }
            | ClassifiedLine::Paragraph { .. } => Ok(None),
        }
    }

    /// Close any open sink and report what was written.
    pub fn finish(mut self) -> Result<RouteSummary> {
        self.close_sink()?;
        Ok(self.summary)
    }

    fn switch_to(&mut self, path: &Path) -> Result<RouteNotice> {
        let seen = self.opened.iter().any(|opened| opened == path);

        if self.policy.skip_existing && !seen && self.opener.exists(path) {
            self.close_sink()?;
            self.current_path = Some(path.to_path_buf());
            self.writing = false;
            self.skipping = true;
            if !self.summary.skipped.iter().any(|skipped| skipped == path) {
                self.summary.skipped.push(path.to_path_buf());
            }
            info!(path = %path.display(), "destination exists, skipping");
            return Ok(RouteNotice::SkippedExisting {
                path: path.to_path_buf(),
            });
        }

        if self.policy.repeat == RepeatPolicy::Append
            && self.current_path.as_deref() == Some(path)
            && let Some(sink) = &self.sink
        {
            self.writing = true;
            self.skipping = false;
            debug!(path = %path.display(), "resuming open destination");
            return Ok(RouteNotice::Resumed {
                path: sink.path().to_path_buf(),
            });
        }

        self.close_sink()?;
        let mode = match self.policy.repeat {
            RepeatPolicy::Append if seen => OpenMode::Append,
            _ => OpenMode::Truncate,
        };
        let sink = self.opener.open(path, mode)?;
        let resolved = sink.path().to_path_buf();
        info!(path = %resolved.display(), ?mode, "writing destination");

        if !seen {
            self.opened.push(path.to_path_buf());
            self.summary.files.push(resolved.clone());
        }
        self.sink = Some(sink);
        self.current_path = Some(path.to_path_buf());
        self.writing = true;
        self.skipping = false;
        Ok(RouteNotice::Opened { path: resolved })
    }

    fn write(&mut self, content: &str) -> Result<Option<RouteNotice>> {
        if self.writing
            && let Some(sink) = self.sink.as_mut()
        {
            sink.write_line(content)?;
            self.summary.lines_written += 1;
            return Ok(None);
        }

        self.summary.lines_dropped += 1;
        let reason = if self.skipping {
            DropReason::SkippedDestination
        } else {
            warn!("code line without destination, dropped");
            DropReason::NoDestination
        };
        Ok(Some(RouteNotice::Dropped {
            content: content.to_string(),
            reason,
        }))
    }

    fn close_sink(&mut self) -> Result<()> {
        if let Some(sink) = self.sink.take() {
            sink.close()?;
        }
        Ok(())
    }
}
