//! Configuration loading and validation for agentry.
//!
//! Loads configuration from `~/.agentry/config.toml` with environment
//! variable overrides. Everything is validated before it is handed out.

mod logging;

pub use logging::init_logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.agentry/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model call parameters for the conversational agent
    #[serde(default)]
    pub agent: AgentSettings,

    /// History policy applied before every model call
    #[serde(default)]
    pub memory: MemorySettings,

    /// Reasoning loop settings
    #[serde(default)]
    pub react: ReactSettings,

    /// Response caching
    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_agent_name")]
    pub name: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Maximum tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    /// End-user identifier forwarded to the backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Stream responses to stdout
    #[serde(default)]
    pub stream: bool,
}

fn default_agent_name() -> String {
    "assistant".into()
}
fn default_model() -> String {
    "gpt-4".into()
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            model: default_model(),
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: vec![],
            presence_penalty: None,
            frequency_penalty: None,
            user: None,
            stream: false,
        }
    }
}

/// Which history policy to install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    /// Send the full history every time
    #[default]
    None,
    /// Keep the last `size` messages plus every system message
    Buffer,
    /// Keep the newest suffix that fits `max_tokens`
    TokenBuffer,
    /// Like `token_buffer`, but summarize whatever gets dropped
    Summarizer,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::None => "none",
            MemoryKind::Buffer => "buffer",
            MemoryKind::TokenBuffer => "token_buffer",
            MemoryKind::Summarizer => "summarizer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorySettings {
    #[serde(default)]
    pub kind: MemoryKind,

    /// Message budget for `buffer`
    #[serde(default = "default_buffer_size")]
    pub size: usize,

    /// Token budget for `token_buffer` and `summarizer`
    #[serde(default = "default_memory_max_tokens")]
    pub max_tokens: usize,

    /// Tokens per whitespace-separated word. Ignored when `tokenizer_model` is set.
    #[serde(default = "default_token_ratio")]
    pub token_ratio: f64,

    /// Pick a calibrated word ratio for this model family instead of `token_ratio`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenizer_model: Option<String>,

    /// Output cap for the summarizing sub-agent
    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
}

fn default_buffer_size() -> usize {
    20
}
fn default_memory_max_tokens() -> usize {
    4000
}
fn default_token_ratio() -> f64 {
    1.55
}
fn default_summary_max_tokens() -> u32 {
    1000
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            kind: MemoryKind::None,
            size: default_buffer_size(),
            max_tokens: default_memory_max_tokens(),
            token_ratio: default_token_ratio(),
            tokenizer_model: None,
            summary_max_tokens: default_summary_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactSettings {
    /// Stop the loop after this many model turns. Unbounded when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Wrap the agent in an in-memory response cache
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit newline-delimited JSON instead of human-readable lines
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, then apply overrides.
    ///
    /// Environment variables (highest priority):
    /// - `AGENTRY_MODEL`
    /// - `AGENTRY_TEMPERATURE`
    /// - `AGENTRY_MAX_TOKENS`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration held in memory.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".agentry")
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("AGENTRY_MODEL") {
            self.agent.model = model;
        }

        if let Some(raw) = lookup("AGENTRY_TEMPERATURE") {
            let temperature = raw.trim().parse::<f32>().map_err(|_| {
                ConfigError::ValidationError(format!("AGENTRY_TEMPERATURE is not a number: {raw:?}"))
            })?;
            self.agent.temperature = Some(temperature);
        }

        if let Some(raw) = lookup("AGENTRY_MAX_TOKENS") {
            let max_tokens = raw.trim().parse::<u32>().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "AGENTRY_MAX_TOKENS is not a positive integer: {raw:?}"
                ))
            })?;
            self.agent.max_tokens = Some(max_tokens);
        }

        Ok(())
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("agent.model must not be empty".into()));
        }

        if let Some(t) = self.agent.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(ConfigError::ValidationError(
                "agent.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if let Some(p) = self.agent.top_p
            && !(0.0..=1.0).contains(&p)
        {
            return Err(ConfigError::ValidationError(
                "agent.top_p must be between 0.0 and 1.0".into(),
            ));
        }

        match self.memory.kind {
            MemoryKind::None => {}
            MemoryKind::Buffer => {
                if self.memory.size == 0 {
                    return Err(ConfigError::ValidationError(
                        "memory.size must be at least 1".into(),
                    ));
                }
            }
            MemoryKind::TokenBuffer | MemoryKind::Summarizer => {
                if self.memory.max_tokens == 0 {
                    return Err(ConfigError::ValidationError(
                        "memory.max_tokens must be > 0".into(),
                    ));
                }
                if self.memory.tokenizer_model.is_none() && self.memory.token_ratio <= 0.0 {
                    return Err(ConfigError::ValidationError(
                        "memory.token_ratio must be > 0".into(),
                    ));
                }
            }
        }

        if self.react.max_iterations == Some(0) {
            return Err(ConfigError::ValidationError(
                "react.max_iterations must be at least 1 when set".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
