//! Side-effecting boundaries: filesystem, HTTP, transcript, config.

pub mod config;
pub mod files;
pub mod ollama;
pub mod prompt;
pub mod provider;
pub mod router;
pub mod transcript;
