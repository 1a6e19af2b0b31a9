//! Decides whether announced text names an output file.

use crate::core::classifier::ClassifiedLine;

/// Destination announced by a marker or file tag, if the node is one.
///
/// A candidate names a file when its final path segment contains a `.`;
/// `**notes**` does not, `**src/notes.md**` does. Surrounding backticks are
/// dropped so ``**`src/a.rs`**`` routes like `**src/a.rs**`.
pub fn announced_destination(node: &ClassifiedLine) -> Option<&str> {
    let candidate = match node {
        ClassifiedLine::Marker { text, .. } => text.as_str(),
        ClassifiedLine::FileTag { path } => path.as_str(),
        _ => return None,
    };
    let candidate = candidate.trim().trim_matches('`').trim();
    looks_like_file(candidate).then_some(candidate)
}

pub fn looks_like_file(candidate: &str) -> bool {
    let last_segment = candidate.rsplit(['/', '\\']).next().unwrap_or(candidate);
    last_segment.contains('.')
}
