//! Interactive chat session (`nut interactive`).
//!
//! [`Session`] is owned by the REPL loop and mutated only through
//! [`Session::handle_command`]. Plain input lines run as tasks over the
//! session's current files; `$` lines are commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, instrument};

use crate::console::{Console, ConsoleMode};
use crate::core::classifier::ClassifiedLine;
use crate::driver::{TaskOptions, run_task};
use crate::io::files::expand_glob;
use crate::io::provider::ModelProvider;
use crate::io::router::{RoutePolicy, SinkOpener};
use crate::io::transcript::Transcript;
use crate::task::Task;

const PREVIEW_CHARS: usize = 100;
const INVALID_COMMAND: &str = "Invalid command. Use $help for available commands";

/// One prompt and the prose the model answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub prompt: String,
    pub response: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub model: String,
    pub files: Vec<PathBuf>,
    pub system_prompt: Option<String>,
    pub verbose: bool,
    pub debug: bool,
    pub history: Vec<HistoryEntry>,
}

#[derive(Parser, Debug)]
#[command(name = "$", no_binary_name = true, disable_version_flag = true)]
struct SessionCommand {
    #[command(subcommand)]
    action: SessionAction,
}

#[derive(Subcommand, Debug)]
enum SessionAction {
    /// Show raw lines and node kinds; without a value, print the setting.
    Verbose { value: Option<bool> },
    /// List the files sent as context.
    Context,
    /// Show the system prompt.
    System,
    /// Add files matching a glob to the context.
    Add { pattern: String },
    /// Remove context files whose path contains the pattern.
    Remove { pattern: String },
    /// Show or switch the model.
    Model { name: Option<String> },
    /// List earlier prompts with a response preview.
    History,
}

impl Session {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Run a `$` command (without the `$`) and return the text to print.
    pub fn handle_command(&mut self, input: &str) -> String {
        let parsed = match SessionCommand::try_parse_from(input.split_whitespace()) {
            Ok(parsed) => parsed,
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::DisplayHelp | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) =>
            {
                return err.render().to_string().trim_end().to_string();
            }
            Err(err) => {
                debug!(err = %err, "unparsed session command");
                return INVALID_COMMAND.to_string();
            }
        };

        match parsed.action {
            SessionAction::Verbose { value } => {
                if let Some(value) = value {
                    self.verbose = value;
                }
                format!("verbose: {}", self.verbose)
            }
            SessionAction::Context => {
                if self.files.is_empty() {
                    "(no files)".to_string()
                } else {
                    self.files
                        .iter()
                        .map(|path| path.display().to_string())
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            }
            SessionAction::System => self
                .system_prompt
                .clone()
                .unwrap_or_else(|| "(no system prompt)".to_string()),
            SessionAction::Add { pattern } => match expand_glob(&pattern) {
                Ok(found) => {
                    let before = self.files.len();
                    for path in found {
                        if !self.files.contains(&path) {
                            self.files.push(path);
                        }
                    }
                    format!(
                        "added {} file(s), {} in context",
                        self.files.len() - before,
                        self.files.len()
                    )
                }
                Err(err) => format!("error: {err:#}"),
            },
            SessionAction::Remove { pattern } => {
                let before = self.files.len();
                self.files
                    .retain(|path| !path.display().to_string().contains(&pattern));
                format!(
                    "removed {} file(s), {} in context",
                    before - self.files.len(),
                    self.files.len()
                )
            }
            SessionAction::Model { name } => {
                if let Some(name) = name {
                    self.model = name;
                }
                format!("model: {}", self.model)
            }
            SessionAction::History => {
                if self.history.is_empty() {
                    return "(no history)".to_string();
                }
                self.history
                    .iter()
                    .enumerate()
                    .map(|(index, entry)| {
                        format!("{}. {}\n   {}", index + 1, entry.prompt, preview(&entry.response))
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
    }

    fn task_for(&self, prompt: &str) -> Task {
        Task::new(prompt)
            .with_files(self.files.clone())
            .with_system_prompt(self.system_prompt.clone())
    }
}

/// Run-wide settings the session does not own.
#[derive(Debug, Clone)]
pub struct ReplSettings {
    pub max_retries: u32,
    pub route: RoutePolicy,
    pub transcript: Transcript,
}

/// Read lines from `input` until `exit` or end of input.
#[instrument(skip_all, fields(model = %session.model))]
pub async fn run_repl<R, W, P, O>(
    session: &mut Session,
    input: R,
    out: W,
    provider: &P,
    opener: O,
    settings: &ReplSettings,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: std::io::Write,
    P: ModelProvider + ?Sized,
    O: SinkOpener + Clone + 'static,
{
    let mut lines = input.lines();
    let mut console = Console::new(out, ConsoleMode::Chat);
    console.println("Type a prompt, $help for commands, exit to quit.");

    loop {
        console.print("> ");
        let Some(line) = lines.next_line().await.context("read input")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" {
            break;
        }
        if let Some(command) = line.strip_prefix('$') {
            let reply = session.handle_command(command);
            console.println(&reply);
            continue;
        }

        console.set_mode(if session.verbose {
            ConsoleMode::Verbose
        } else {
            ConsoleMode::Chat
        });
        let options = TaskOptions {
            model: session.model.clone(),
            max_retries: settings.max_retries,
            route: settings.route,
        };
        settings.transcript.task_header(session.history.len());

        let mut response = String::new();
        let result = run_task(
            &session.task_for(line),
            provider,
            opener.clone(),
            &options,
            &settings.transcript,
            |node, raw| {
                console.observe(node, raw);
                if let ClassifiedLine::Paragraph { text } = node {
                    response.push_str(&text.plain());
                    response.push('\n');
                }
            },
        )
        .await;

        match result {
            Ok(outcome) => {
                if session.debug {
                    let files = outcome
                        .route
                        .files
                        .iter()
                        .map(|path| path.display().to_string())
                        .collect::<Vec<_>>();
                    console.println(&format!(
                        "[{} lines, wrote {:?}, dropped {}]",
                        outcome.lines,
                        files,
                        outcome.route.lines_dropped
                    ));
                }
                session.history.push(HistoryEntry {
                    prompt: line.to_string(),
                    response: response.trim_end().to_string(),
                });
            }
            Err(err) => console.println(&format!("task failed: {err:#}")),
        }
    }
    Ok(())
}

/// First line-joined characters of a response, for `$history`.
fn preview(response: &str) -> String {
    let flat = response.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= PREVIEW_CHARS {
        return flat;
    }
    let cut: String = flat.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}
