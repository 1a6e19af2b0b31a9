//! Command implementations behind the `nut` binary.

use std::cell::RefCell;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use tracing::{info, instrument};

use crate::console::{Console, ConsoleMode};
use crate::driver::{TaskOptions, TaskOutcome, run_task};
use crate::exit_codes;
use crate::io::config::{
    ConfigOverrides, DEFAULT_CONFIG_PATH, NutConfig, apply_overrides, load_config,
};
use crate::io::files::discover_inputs;
use crate::io::ollama::OllamaProvider;
use crate::io::provider::ModelProvider;
use crate::io::router::{FsOpener, OpenMode, RoutePolicy, Sink, SinkOpener, StdoutOpener};
use crate::io::transcript::Transcript;
use crate::replay::replay;
use crate::sequencer::{SeriesReport, run_in_series_with};
use crate::session::{ReplSettings, Session, run_repl};
use crate::task::Task;

/// Options shared by `do` and `interactive`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Output root for generated files; `-` writes them to stdout.
    #[arg(short, long, default_value = "./")]
    pub output: String,

    /// Glob selecting input files; one task runs per file.
    #[arg(short, long)]
    pub input: Option<String>,

    /// File listing input paths, one per line.
    #[arg(short, long)]
    pub files: Option<PathBuf>,

    /// Model to use (overrides the config file).
    #[arg(short, long)]
    pub model: Option<String>,

    /// Echo raw lines and node kinds while streaming.
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the transcript to stdout when no log file is given.
    #[arg(short, long)]
    pub debug: bool,

    /// Write the transcript to this file.
    #[arg(short, long)]
    pub log: Option<PathBuf>,

    /// Leave files that already exist untouched.
    #[arg(short, long)]
    pub skip: bool,

    /// File holding the system prompt.
    #[arg(long)]
    pub system: Option<PathBuf>,

    /// Ollama base URL (overrides the config file).
    #[arg(long)]
    pub ollama_url: Option<String>,

    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct DoArgs {
    /// What the model should do.
    #[arg(required = true, num_args = 1..)]
    pub prompt: Vec<String>,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct InteractiveArgs {
    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ReplayArgs {
    /// Recorded response or transcript.
    pub log: PathBuf,

    /// Print classified nodes instead of routed lines.
    #[arg(long)]
    pub nodes: bool,
}

/// Where routed code goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    Dir(PathBuf),
}

impl OutputTarget {
    pub fn parse(value: &str) -> Self {
        match value {
            "-" => Self::Stdout,
            dir => Self::Dir(PathBuf::from(dir)),
        }
    }

    /// Create the output root up front.
    pub fn prepare(&self) -> Result<()> {
        if let Self::Dir(root) = self {
            fs::create_dir_all(root)
                .with_context(|| format!("create output dir {}", root.display()))?;
        }
        Ok(())
    }
}

impl SinkOpener for OutputTarget {
    fn open(&mut self, path: &Path, mode: OpenMode) -> Result<Sink> {
        match self {
            Self::Stdout => StdoutOpener.open(path, mode),
            Self::Dir(root) => FsOpener::new(root.as_path()).open(path, mode),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        match self {
            Self::Stdout => StdoutOpener.exists(path),
            Self::Dir(root) => FsOpener::new(root.as_path()).exists(path),
        }
    }
}

/// Everything resolved before the first task runs.
#[derive(Debug)]
struct Setup {
    config: NutConfig,
    inputs: Vec<PathBuf>,
    system_prompt: Option<String>,
    transcript: Transcript,
    log_path: Option<PathBuf>,
    output: OutputTarget,
    route: RoutePolicy,
}

impl Setup {
    fn prepare(args: &RunArgs) -> Result<Self> {
        let overrides = ConfigOverrides {
            model: args.model.clone(),
            ollama_url: args.ollama_url.clone(),
        };
        let config = apply_overrides(load_config(&args.config)?, &overrides)?;

        let system_prompt = args
            .system
            .as_deref()
            .map(|path| {
                fs::read_to_string(path)
                    .with_context(|| format!("read system prompt {}", path.display()))
            })
            .transpose()?;
        let inputs = discover_inputs(args.input.as_deref(), args.files.as_deref())?;

        let transcript = match (&args.log, args.debug) {
            (Some(path), _) => Transcript::to_file(path)?,
            (None, true) => Transcript::to_stdout(),
            (None, false) => Transcript::disabled(),
        };

        let output = OutputTarget::parse(&args.output);
        output.prepare()?;

        let route = RoutePolicy {
            repeat: config.repeat_policy,
            skip_existing: args.skip,
        };
        Ok(Self {
            config,
            inputs,
            system_prompt,
            transcript,
            log_path: args.log.clone(),
            output,
            route,
        })
    }

    fn task_options(&self) -> TaskOptions {
        TaskOptions {
            model: self.config.model.clone(),
            max_retries: self.config.max_retries,
            route: self.route,
        }
    }
}

/// One task per input file, or a single context-free task without inputs.
pub fn build_tasks(prompt: &str, inputs: &[PathBuf], system_prompt: Option<&str>) -> Vec<Task> {
    let system_prompt = system_prompt.map(str::to_string);
    if inputs.is_empty() {
        return vec![Task::new(prompt).with_system_prompt(system_prompt)];
    }
    inputs
        .iter()
        .map(|path| {
            Task::new(prompt)
                .with_files(vec![path.clone()])
                .with_system_prompt(system_prompt.clone())
        })
        .collect()
}

/// Run `tasks` in series, printing progress to `console`.
pub async fn run_tasks<P, O, W>(
    tasks: &[Task],
    provider: &P,
    opener: &O,
    options: &TaskOptions,
    transcript: &Transcript,
    console: &RefCell<Console<W>>,
) -> SeriesReport<TaskOutcome>
where
    P: ModelProvider + ?Sized,
    O: SinkOpener + Clone + 'static,
    W: Write,
{
    let total = tasks.len();
    let jobs = tasks.iter().enumerate().map(move |(index, task)| {
        move || async move {
            console
                .borrow_mut()
                .println(&format!("Processing task {}/{total}", index + 1));
            transcript.task_header(index);
            run_task(task, provider, opener.clone(), options, transcript, |node, raw| {
                console.borrow_mut().observe(node, raw);
            })
            .await
        }
    });

    run_in_series_with(jobs, |index, result| {
        let mut console = console.borrow_mut();
        match result {
            Ok(outcome) => {
                let files = outcome
                    .route
                    .files
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>();
                if !files.is_empty() {
                    console.println(&format!("Wrote {}", files.join(", ")));
                }
            }
            Err(err) => console.println(&format!("Task {} failed: {err:#}", index + 1)),
        }
    })
    .await
}

fn console_mode(verbose: bool) -> ConsoleMode {
    if verbose {
        ConsoleMode::Verbose
    } else {
        ConsoleMode::Chat
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("build async runtime")
}

/// `nut do`: run the prompt over every input file.
#[instrument(skip_all)]
pub fn do_tasks(args: &DoArgs) -> Result<i32> {
    let setup = Setup::prepare(&args.run)?;
    let provider = OllamaProvider::new(&setup.config)?;
    let prompt = args.prompt.join(" ");
    let tasks = build_tasks(&prompt, &setup.inputs, setup.system_prompt.as_deref());

    let console = RefCell::new(Console::new(io::stdout(), console_mode(args.run.verbose)));
    {
        let mut console = console.borrow_mut();
        console.println(&format!("Using model {}", setup.config.model));
        console.println(&format!("Work divided over {} tasks", tasks.len()));
        if let Some(path) = &setup.log_path {
            console.println(&format!("using log file {}", path.display()));
        }
    }
    info!(tasks = tasks.len(), output = ?setup.output, "starting run");

    let options = setup.task_options();
    let report = runtime()?.block_on(run_tasks(
        &tasks,
        &provider,
        &setup.output,
        &options,
        &setup.transcript,
        &console,
    ));
    setup.transcript.flush();

    let mut console = console.into_inner();
    if !report.failures.is_empty() {
        console.println(&format!(
            "{} of {} tasks failed",
            report.failures.len(),
            report.total()
        ));
    }
    console.println("All Done");

    Ok(if report.all_failed() {
        exit_codes::ALL_FAILED
    } else {
        exit_codes::OK
    })
}

/// `nut interactive`: chat loop on stdin.
#[instrument(skip_all)]
pub fn interactive(args: &InteractiveArgs) -> Result<i32> {
    let setup = Setup::prepare(&args.run)?;
    let provider = OllamaProvider::new(&setup.config)?;

    let mut session = Session {
        model: setup.config.model.clone(),
        files: setup.inputs.clone(),
        system_prompt: setup.system_prompt.clone(),
        verbose: args.run.verbose,
        debug: args.run.debug,
        history: Vec::new(),
    };
    let settings = ReplSettings {
        max_retries: setup.config.max_retries,
        route: setup.route,
        transcript: setup.transcript.clone(),
    };
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());

    runtime()?.block_on(run_repl(
        &mut session,
        stdin,
        io::stdout(),
        &provider,
        setup.output.clone(),
        &settings,
    ))?;
    setup.transcript.flush();
    Ok(exit_codes::OK)
}

/// `nut replay`: show where a recorded response would route its code.
#[instrument(skip_all, fields(log = %args.log.display()))]
pub fn replay_log(args: &ReplayArgs) -> Result<i32> {
    let recorded = fs::read_to_string(&args.log)
        .with_context(|| format!("read {}", args.log.display()))?;
    let summary = replay(&recorded, args.nodes, io::stdout())?;

    let route = &summary.outcome.route;
    let mut out = io::stdout().lock();
    writeln!(
        out,
        "{} lines, {} file(s), {} written, {} dropped",
        summary.outcome.lines,
        route.files.len(),
        route.lines_written,
        route.lines_dropped
    )?;
    let document = &summary.document;
    writeln!(
        out,
        "{} code block(s), {} unterminated, {} list(s)",
        document.code_blocks, document.unterminated_blocks, document.lists
    )?;
    Ok(exit_codes::OK)
}
