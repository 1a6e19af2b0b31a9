//! `nut`: stream a model's answer and write its code blocks to the files it names.

use clap::{Parser, Subcommand};
use nut::cli::{self, DoArgs, InteractiveArgs, ReplayArgs};
use nut::{exit_codes, logging};

#[derive(Parser)]
#[command(
    name = "nut",
    version,
    about = "Run prompts against a model and write the code it streams back"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a prompt once per input file.
    #[command(alias = "create")]
    Do(DoArgs),
    /// Chat with the model; `$help` lists session commands.
    #[command(visible_alias = "i", alias = "chat")]
    Interactive(InteractiveArgs),
    /// Show where a recorded response routes its code, without writing files.
    Replay(ReplayArgs),
}

fn main() {
    let cli = Cli::parse();
    logging::init();
    match run(cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    match cli.command {
        Command::Do(args) => cli::do_tasks(&args),
        Command::Interactive(args) => cli::interactive(&args),
        Command::Replay(args) => cli::replay_log(&args),
    }
}
