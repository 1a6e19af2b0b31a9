//! Streamed code generation: run prompts against a model and route the code
//! blocks of its answer into files as the answer streams in.
//!
//! The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (line classification, line
//!   reassembly, destination detection, context rendering). No I/O.
//! - **[`io`]**: Side-effecting boundaries (file routing, the Ollama client,
//!   config, transcript, input discovery). Isolated behind traits so tests can
//!   substitute in-memory doubles.
//!
//! Orchestration modules ([`pipeline`], [`driver`], [`sequencer`], [`session`],
//! [`replay`]) combine the two to implement the CLI commands in [`cli`].

pub mod cli;
pub mod console;
pub mod core;
pub mod driver;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod replay;
pub mod sequencer;
pub mod session;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
