//! Test doubles: scripted model replies, in-memory sinks, shared buffers.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use futures::StreamExt;

use crate::io::provider::{FragmentStream, ModelProvider, ModelRequest};
use crate::io::router::{OpenMode, Sink, SinkOpener};

/// One scripted model call: fragments, or an error message at that position.
pub type ScriptedReply = Vec<Result<String, String>>;

/// Provider that replays predetermined replies, one per call.
///
/// Calls beyond the script fail before yielding anything.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider whose only call streams `fragments` successfully.
    pub fn replying(fragments: &[&str]) -> Self {
        Self::new(vec![ok_reply(fragments)])
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl ModelProvider for ScriptedProvider {
    fn stream(&self, request: &ModelRequest) -> FragmentStream {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or_else(|| vec![Err("no scripted reply left".to_string())]);
        futures::stream::iter(reply.into_iter().map(|item| item.map_err(|msg| anyhow!(msg))))
            .boxed()
    }
}

/// A reply that streams every fragment and completes.
pub fn ok_reply(fragments: &[&str]) -> ScriptedReply {
    fragments.iter().map(|f| Ok((*f).to_string())).collect()
}

/// A reply that fails before the first fragment.
pub fn failing_reply(message: &str) -> ScriptedReply {
    vec![Err(message.to_string())]
}

#[derive(Debug, Default)]
struct MemoryState {
    written: BTreeMap<PathBuf, String>,
    existing: BTreeSet<PathBuf>,
    opens: Vec<(PathBuf, OpenMode)>,
    closes: usize,
}

/// Opener that keeps destination contents in memory.
///
/// Clones share state, so a test keeps one clone and hands another to the router.
#[derive(Debug, Clone, Default)]
pub struct MemoryOpener {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend these destinations exist already (for skip-existing).
    pub fn with_existing<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let opener = Self::new();
        opener
            .state
            .lock()
            .expect("memory lock")
            .existing
            .extend(paths.into_iter().map(Into::into));
        opener
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<String> {
        self.state
            .lock()
            .expect("memory lock")
            .written
            .get(path.as_ref())
            .cloned()
    }

    /// Written destinations, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.state
            .lock()
            .expect("memory lock")
            .written
            .keys()
            .cloned()
            .collect()
    }

    pub fn opens(&self) -> Vec<(PathBuf, OpenMode)> {
        self.state.lock().expect("memory lock").opens.clone()
    }

    /// Number of sinks released so far.
    pub fn close_count(&self) -> usize {
        self.state.lock().expect("memory lock").closes
    }
}

impl SinkOpener for MemoryOpener {
    fn open(&mut self, path: &Path, mode: OpenMode) -> Result<Sink> {
        let mut state = self.state.lock().expect("memory lock");
        state.opens.push((path.to_path_buf(), mode));
        match mode {
            OpenMode::Truncate => {
                state.written.insert(path.to_path_buf(), String::new());
            }
            OpenMode::Append => {
                state.written.entry(path.to_path_buf()).or_default();
            }
        }
        Ok(Sink::new(
            path,
            MemoryWriter {
                path: path.to_path_buf(),
                state: Arc::clone(&self.state),
            },
        ))
    }

    fn exists(&self, path: &Path) -> bool {
        self.state
            .lock()
            .expect("memory lock")
            .existing
            .contains(path)
    }
}

struct MemoryWriter {
    path: PathBuf,
    state: Arc<Mutex<MemoryState>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = std::str::from_utf8(buf).map_err(io::Error::other)?;
        self.state
            .lock()
            .expect("memory lock")
            .written
            .entry(self.path.clone())
            .or_default()
            .push_str(text);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.closes += 1;
        }
    }
}

/// Clonable in-memory writer for console and transcript output.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock().expect("buffer lock")).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Join lines with `\n` terminators, as a model would stream them.
pub fn stream_text(lines: &[&str]) -> String {
    lines.iter().map(|line| format!("{line}\n")).collect()
}

/// Temporary directory populated with `(relative path, contents)` pairs.
pub fn temp_tree(files: &[(&str, &str)]) -> tempfile::TempDir {
    let temp = tempfile::tempdir().expect("tempdir");
    for (rel, contents) in files {
        let path = temp.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture dir");
        }
        std::fs::write(&path, contents).expect("write fixture");
    }
    temp
}
