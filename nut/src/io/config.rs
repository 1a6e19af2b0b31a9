//! Configuration stored under `.nut/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::io::router::RepeatPolicy;

/// Default config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".nut/config.toml";

/// nut configuration (TOML).
///
/// Intended to be edited by humans. Missing fields take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NutConfig {
    /// Model identifier passed to the provider.
    pub model: String,

    /// Base URL of the Ollama server.
    pub ollama_url: String,

    /// Context window requested from Ollama (`options.num_ctx`).
    pub num_ctx: u32,

    /// Extra attempts per task when the model call fails before streaming.
    pub max_retries: u32,

    /// Seconds without progress before the HTTP client gives up.
    pub request_timeout_secs: u64,

    /// Behavior when a task announces the same destination twice.
    pub repeat_policy: RepeatPolicy,
}

impl Default for NutConfig {
    fn default() -> Self {
        Self {
            model: "llama3.1".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            num_ctx: 32 * 1024,
            max_retries: 1,
            request_timeout_secs: 600,
            repeat_policy: RepeatPolicy::Truncate,
        }
    }
}

impl NutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if !(self.ollama_url.starts_with("http://") || self.ollama_url.starts_with("https://")) {
            return Err(anyhow!("ollama_url must start with http:// or https://"));
        }
        if self.num_ctx == 0 {
            return Err(anyhow!("num_ctx must be > 0"));
        }
        if self.max_retries > 1 {
            return Err(anyhow!("max_retries must be 0 or 1"));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow!("request_timeout_secs must be > 0"));
        }
        Ok(())
    }
}

/// Values supplied on the command line, applied over the file config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub ollama_url: Option<String>,
}

/// Apply command-line overrides to a loaded config.
pub fn apply_overrides(mut base: NutConfig, overrides: &ConfigOverrides) -> Result<NutConfig> {
    if let Some(model) = &overrides.model {
        base.model = model.clone();
    }
    if let Some(url) = &overrides.ollama_url {
        base.ollama_url = url.clone();
    }
    base.validate()?;
    Ok(base)
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `NutConfig::default()`.
pub fn load_config(path: &Path) -> Result<NutConfig> {
    if !path.exists() {
        let cfg = NutConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: NutConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
