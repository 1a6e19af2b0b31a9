//! Rendering of task context files into the prompt.

use std::path::{Path, PathBuf};

use crate::core::classifier::FENCE;

/// A context file with its contents already loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    pub path: PathBuf,
    pub content: String,
}

/// Language tag for a fenced block, taken from the file extension.
pub fn language_tag(path: &Path) -> &str {
    path.extension().and_then(|ext| ext.to_str()).unwrap_or("")
}

/// Render each file as a `***path***` marker followed by a fenced block.
///
/// The marker uses the same syntax the model is asked to emit, so a response
/// that echoes a file back routes it to the same path.
pub fn render_context(files: &[ContextFile]) -> String {
    files
        .iter()
        .map(|file| {
            format!(
                "***{path}***\n{FENCE}{lang}\n{content}\n{FENCE}",
                path = file.path.display(),
                lang = language_tag(&file.path),
                content = file.content,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
