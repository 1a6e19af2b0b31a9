//! A unit of work: one prompt plus the files it is about.

use std::path::PathBuf;

use anyhow::Result;

use crate::core::context::render_context;
use crate::io::files::load_context_files;

/// Immutable task description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    prompt: String,
    files: Vec<PathBuf>,
    system_prompt: Option<String>,
}

impl Task {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            files: Vec::new(),
            system_prompt: None,
        }
    }

    pub fn with_files(mut self, files: Vec<PathBuf>) -> Self {
        self.files = files;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Read the task files and render them as prompt context.
    ///
    /// Files are read at call time; an unreadable file fails the task.
    pub fn context(&self) -> Result<String> {
        let files = load_context_files(&self.files)?;
        Ok(render_context(&files))
    }
}
