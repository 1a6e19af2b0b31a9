//! Input-file discovery and context loading.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::context::ContextFile;

const SKIPPED_DIR: &str = "node_modules";

/// Expand a glob into regular files, skipping anything under `node_modules`.
///
/// Results are sorted and deduplicated.
pub fn expand_glob(pattern: &str) -> Result<Vec<PathBuf>> {
    let entries = glob::glob(pattern).with_context(|| format!("invalid glob pattern {pattern}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.context("read glob entry")?;
        if is_skipped(&path) || !path.is_file() {
            continue;
        }
        files.push(path);
    }
    files.sort();
    files.dedup();
    debug!(pattern, count = files.len(), "expanded input glob");
    Ok(files)
}

/// Read a newline-separated file list. Blank lines are ignored.
pub fn read_file_list(path: &Path) -> Result<Vec<PathBuf>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read file list {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Combine `--input` and `--files` into one ordered list without duplicates.
pub fn discover_inputs(input: Option<&str>, files: Option<&Path>) -> Result<Vec<PathBuf>> {
    let mut discovered = Vec::new();
    if let Some(pattern) = input {
        discovered.extend(expand_glob(pattern)?);
    }
    if let Some(list) = files {
        for path in read_file_list(list)? {
            if !discovered.contains(&path) {
                discovered.push(path);
            }
        }
    }
    Ok(discovered)
}

/// Read every file in full, in order.
pub fn load_context_files(paths: &[PathBuf]) -> Result<Vec<ContextFile>> {
    paths
        .iter()
        .map(|path| {
            let content = fs::read_to_string(path)
                .with_context(|| format!("read context file {}", path.display()))?;
            Ok(ContextFile {
                path: path.clone(),
                content,
            })
        })
        .collect()
}

fn is_skipped(path: &Path) -> bool {
    path.components()
        .any(|component| matches!(component, Component::Normal(part) if part == SKIPPED_DIR))
}
