//! Markdown transcript of prompts, raw fragments and routing notices.
//!
//! The transcript is a product artifact (`--log`, `--debug`), unrelated to
//! `tracing`. Writes are best effort: the first failure is logged and the
//! transcript disables itself so a broken log never fails a task.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex};

use anyhow::{Context, Result};
use regex::Regex;
use tracing::warn;

use crate::io::router::{DropReason, RouteNotice};

/// Annotations written by [`Transcript::notice`] and [`Transcript::error`].
static ANNOTATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\n<!-- (?:(?:Writing to|Resuming|skipped existing|error): [^\n]*|dropped code) -->\n",
    )
    .expect("annotation pattern is valid")
});

/// Remove the transcript's own annotations, restoring the raw response.
///
/// Other HTML comments, including ones the model wrote, are left alone.
pub fn strip_annotations(text: &str) -> String {
    ANNOTATION_RE.replace_all(text, "").into_owned()
}

type SharedWriter = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

/// Cheaply clonable handle to the transcript sink.
#[derive(Clone)]
pub struct Transcript {
    writer: SharedWriter,
}

impl Transcript {
    /// A transcript that records nothing.
    pub fn disabled() -> Self {
        Self {
            writer: Arc::new(Mutex::new(None)),
        }
    }

    /// Record into `path`, creating parent directories. The file is truncated.
    pub fn to_file(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("create log {}", path.display()))?;
        Ok(Self::to_writer(BufWriter::new(file)))
    }

    pub fn to_stdout() -> Self {
        Self::to_writer(io::stdout())
    }

    pub fn to_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Some(Box::new(writer)))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writer.lock().is_ok_and(|guard| guard.is_some())
    }

    pub fn task_header(&self, index: usize) {
        self.write(&format!("# Task {index}\n"));
    }

    pub fn prompt(&self, prompt: &str) {
        self.write(&format!("## Prompt\n{prompt}\n\n\n"));
    }

    pub fn response_header(&self) {
        self.write("## Response\n");
    }

    /// Raw model output, recorded exactly as received.
    pub fn fragment(&self, fragment: &str) {
        self.write(fragment);
    }

    pub fn notice(&self, notice: &RouteNotice) {
        let body = match notice {
            RouteNotice::Opened { path } => format!("Writing to: {}", path.display()),
            RouteNotice::Resumed { path } => format!("Resuming: {}", path.display()),
            RouteNotice::SkippedExisting { path } => {
                format!("skipped existing: {}", path.display())
            }
            RouteNotice::Dropped {
                reason: DropReason::NoDestination,
                ..
            } => "dropped code".to_string(),
            RouteNotice::Dropped {
                reason: DropReason::SkippedDestination,
                ..
            } => return,
        };
        self.annotate(&body);
    }

    pub fn error(&self, message: &str) {
        self.annotate(&format!("error: {message}"));
    }

    pub fn task_footer(&self) {
        self.write("\n\n");
        self.flush();
    }

    pub fn flush(&self) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        if let Some(writer) = guard.as_mut()
            && let Err(err) = writer.flush()
        {
            warn!(err = %err, "transcript flush failed, disabling transcript");
            *guard = None;
        }
    }

    /// One-line HTML comment between fragments; embedded line breaks are
    /// flattened so [`strip_annotations`] can find it again.
    fn annotate(&self, body: &str) {
        let body = body.split_whitespace().collect::<Vec<_>>().join(" ");
        self.write(&format!("\n<!-- {body} -->\n"));
    }

    fn write(&self, text: &str) {
        let Ok(mut guard) = self.writer.lock() else {
            return;
        };
        if let Some(writer) = guard.as_mut()
            && let Err(err) = writer.write_all(text.as_bytes())
        {
            warn!(err = %err, "transcript write failed, disabling transcript");
            *guard = None;
        }
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::test_support::SharedBuffer;

    #[test]
    fn records_task_sections_in_order() {
        let buffer = SharedBuffer::new();
        let transcript = Transcript::to_writer(buffer.clone());

        transcript.task_header(0);
        transcript.prompt("make a.js");
        transcript.response_header();
        transcript.fragment("**a.js**\n```js\n");
        transcript.notice(&RouteNotice::Opened {
            path: PathBuf::from("out/a.js"),
        });
        transcript.task_footer();

        assert_eq!(
            buffer.contents(),
            concat!(
                "# Task 0\n## Prompt\nmake a.js\n\n\n## Response\n**a.js**\n```js\n",
                "\n<!-- Writing to: out/a.js -->\n\n\n"
            )
        );
    }

    #[test]
    fn dropped_code_is_annotated_but_skipped_code_is_not() {
        let buffer = SharedBuffer::new();
        let transcript = Transcript::to_writer(buffer.clone());

        transcript.notice(&RouteNotice::Dropped {
            content: "x".to_string(),
            reason: DropReason::NoDestination,
        });
        transcript.notice(&RouteNotice::Dropped {
            content: "y".to_string(),
            reason: DropReason::SkippedDestination,
        });

        assert_eq!(buffer.contents(), "\n<!-- dropped code -->\n");
    }

    #[test]
    fn multi_line_error_becomes_one_strippable_annotation() {
        let buffer = SharedBuffer::new();
        let transcript = Transcript::to_writer(buffer.clone());

        transcript.fragment("partial\n");
        transcript.error("ollama returned 502:\n<html>\n  bad gateway\n</html>");

        assert_eq!(
            buffer.contents(),
            "partial\n\n<!-- error: ollama returned 502: <html> bad gateway </html> -->\n"
        );
        assert_eq!(strip_annotations(&buffer.contents()), "partial\n");
    }

    #[test]
    fn strip_keeps_comments_the_model_wrote() {
        let text = concat!(
            "```html\n<!-- header -->\n<div></div>\n```\n",
            "\n<!-- Writing to: a.html -->\n",
            "<!-- Writing down notes -->\n"
        );
        assert_eq!(
            strip_annotations(text),
            "```html\n<!-- header -->\n<div></div>\n```\n<!-- Writing down notes -->\n"
        );
    }

    #[test]
    fn disabled_transcript_is_silent() {
        let transcript = Transcript::disabled();
        transcript.prompt("ignored");
        transcript.task_footer();
        assert!(!transcript.is_enabled());
    }

    #[test]
    fn to_file_creates_parent_dirs() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("logs/run.md");
        let transcript = Transcript::to_file(&path).expect("transcript");
        transcript.task_header(3);
        transcript.flush();

        assert_eq!(fs::read_to_string(&path).expect("read"), "# Task 3\n");
    }
}
