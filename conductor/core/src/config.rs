//! TOML Configuration File Support
//!
//! Centralized configuration loading for parley, supporting a TOML
//! configuration file at `~/.config/parley/parley.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [assistant]
//! assistant_id = "asst_abc123"
//! base_url = "https://api.openai.com/v1"
//!
//! [polling]
//! interval_ms = 1000
//! max_attempts = 120
//! deadline_secs = 180
//!
//! [server]
//! bind = "127.0.0.1:3000"
//! chunk_chars = 64
//!
//! [client]
//! endpoint = "http://127.0.0.1:3000/api/chat"
//! summary_length = "none"
//! ```
//!
//! The API key is normally supplied through `OPENAI_API_KEY` rather than the file.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::DEFAULT_BASE_URL;
use crate::orchestrator::PollPolicy;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Assistant section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantToml {
    /// API key (prefer `OPENAI_API_KEY`)
    pub api_key: Option<String>,

    /// Assistant identity runs are started against
    pub assistant_id: Option<String>,

    /// API base URL
    pub base_url: Option<String>,
}

/// Polling section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingToml {
    /// Wait between run status reads, in milliseconds
    pub interval_ms: Option<u64>,

    /// Maximum status reads before giving up (absent = unbounded)
    pub max_attempts: Option<u32>,

    /// Overall polling deadline in seconds (absent = unbounded)
    pub deadline_secs: Option<u64>,
}

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen address
    pub bind: Option<String>,

    /// Characters per streamed body chunk
    pub chunk_chars: Option<usize>,
}

/// Client section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Turn submission endpoint
    pub endpoint: Option<String>,

    /// Summary length tuning field forwarded with each turn
    pub summary_length: Option<String>,

    /// Vector ratio tuning field forwarded with each turn
    pub vector_ratio: Option<f32>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParleyToml {
    /// Assistant configuration section
    pub assistant: AssistantToml,

    /// Polling configuration section
    pub polling: PollingToml,

    /// Server configuration section
    pub server: ServerToml,

    /// Client configuration section
    pub client: ClientToml,
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Resolved assistant settings
#[derive(Clone, Default)]
pub struct AssistantSettings {
    /// API key, if any source supplied one
    pub api_key: Option<String>,
    /// Assistant identity, if any source supplied one
    pub assistant_id: Option<String>,
    /// API base URL
    pub base_url: String,
}

impl std::fmt::Debug for AssistantSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("assistant_id", &self.assistant_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Resolved server settings
#[derive(Clone, Debug)]
pub struct ServerSettings {
    /// Listen address
    pub bind: String,
    /// Characters per streamed body chunk
    pub chunk_chars: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            chunk_chars: 64,
        }
    }
}

/// Resolved client settings
#[derive(Clone, Debug)]
pub struct ClientSettings {
    /// Turn submission endpoint
    pub endpoint: String,
    /// Summary length tuning field
    pub summary_length: Option<String>,
    /// Vector ratio tuning field
    pub vector_ratio: Option<f32>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000/api/chat".to_string(),
            summary_length: None,
            vector_ratio: None,
        }
    }
}

/// Centralized configuration for parley
///
/// Use [`load_config`] to load configuration with proper priority handling.
#[derive(Clone, Debug)]
pub struct ParleyConfig {
    /// Assistant backend settings
    pub assistant: AssistantSettings,

    /// Run polling policy
    pub polling: PollPolicy,

    /// HTTP server settings
    pub server: ServerSettings,

    /// Chat client settings
    pub client: ClientSettings,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Where the assistant identity came from
    assistant_id_source: ConfigSource,

    /// Highest-priority source that contributed any value
    source: ConfigSource,
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self {
            assistant: AssistantSettings {
                api_key: None,
                assistant_id: None,
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            polling: PollPolicy::default(),
            server: ServerSettings::default(),
            client: ClientSettings::default(),
            config_file_path: None,
            assistant_id_source: ConfigSource::Default,
            source: ConfigSource::Default,
        }
    }
}

impl ParleyConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Where the assistant identity came from
    #[must_use]
    pub fn assistant_id_source(&self) -> ConfigSource {
        self.assistant_id_source
    }

    /// Check values that would make every request fail
    ///
    /// A missing assistant id is not rejected here: the orchestrator reports
    /// it per request as a configuration error.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "polling.interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.polling.max_attempts == Some(0) {
            return Err(ConfigError::ValidationError(
                "polling.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.server.chunk_chars == 0 {
            return Err(ConfigError::ValidationError(
                "server.chunk_chars must be greater than zero".to_string(),
            ));
        }
        if let Some(ratio) = self.client.vector_ratio {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(ConfigError::ValidationError(format!(
                    "client.vector_ratio must be within 0.0..=1.0, got {ratio}"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/parley/parley.toml` or
/// `~/.config/parley/parley.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("parley").join("parley.toml"))
}

/// Load configuration from all sources with proper priority
///
/// `PARLEY_CONFIG` overrides the default file location.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed.
/// A missing config file is not an error (defaults are used).
pub fn load_config() -> Result<ParleyConfig, ConfigError> {
    let path = std::env::var_os("PARLEY_CONFIG")
        .map(PathBuf::from)
        .or_else(default_config_path);
    load_config_from_path(path)
}

/// Load configuration from a specific path, then apply the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ParleyConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration using `env` to look up environment variables
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ParleyConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ParleyConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ParleyToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ParleyConfig, toml: &ParleyToml) {
    if toml.assistant.api_key.is_some() {
        config.assistant.api_key.clone_from(&toml.assistant.api_key);
    }
    if toml.assistant.assistant_id.is_some() {
        config
            .assistant
            .assistant_id
            .clone_from(&toml.assistant.assistant_id);
        config.assistant_id_source = ConfigSource::File;
    }
    if let Some(ref base_url) = toml.assistant.base_url {
        config.assistant.base_url.clone_from(base_url);
    }

    if let Some(ms) = toml.polling.interval_ms {
        config.polling.interval = Duration::from_millis(ms);
    }
    if toml.polling.max_attempts.is_some() {
        config.polling.max_attempts = toml.polling.max_attempts;
    }
    if let Some(secs) = toml.polling.deadline_secs {
        config.polling.deadline = Some(Duration::from_secs(secs));
    }

    if let Some(ref bind) = toml.server.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(chars) = toml.server.chunk_chars {
        config.server.chunk_chars = chars;
    }

    if let Some(ref endpoint) = toml.client.endpoint {
        config.client.endpoint.clone_from(endpoint);
    }
    if toml.client.summary_length.is_some() {
        config
            .client
            .summary_length
            .clone_from(&toml.client.summary_length);
    }
    if toml.client.vector_ratio.is_some() {
        config.client.vector_ratio = toml.client.vector_ratio;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<F>(config: &mut ParleyConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = env("OPENAI_API_KEY") {
        config.assistant.api_key = Some(key);
        config.source = ConfigSource::Env;
    }
    if let Some(id) = env("OPENAI_ASSISTANT_ID") {
        config.assistant.assistant_id = Some(id);
        config.assistant_id_source = ConfigSource::Env;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("OPENAI_BASE_URL") {
        config.assistant.base_url = url;
        config.source = ConfigSource::Env;
    }

    if let Some(ms) = env("PARLEY_POLL_INTERVAL_MS").and_then(|v| v.parse::<u64>().ok()) {
        config.polling.interval = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(n) = env("PARLEY_POLL_MAX_ATTEMPTS").and_then(|v| v.parse::<u32>().ok()) {
        config.polling.max_attempts = Some(n);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env("PARLEY_POLL_DEADLINE_SECS").and_then(|v| v.parse::<u64>().ok()) {
        config.polling.deadline = Some(Duration::from_secs(secs));
        config.source = ConfigSource::Env;
    }

    if let Some(bind) = env("PARLEY_BIND") {
        config.server.bind = bind;
        config.source = ConfigSource::Env;
    }
    if let Some(endpoint) = env("PARLEY_ENDPOINT") {
        config.client.endpoint = endpoint;
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Assistant id override
    pub assistant_id: Option<String>,

    /// Listen address override
    pub bind: Option<String>,

    /// Endpoint override
    pub endpoint: Option<String>,

    /// Poll interval override (milliseconds)
    pub poll_interval_ms: Option<u64>,

    /// Max poll attempts override
    pub poll_max_attempts: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set assistant id override
    #[must_use]
    pub fn with_assistant_id(mut self, id: String) -> Self {
        self.assistant_id = Some(id);
        self
    }

    /// Set listen address override
    #[must_use]
    pub fn with_bind(mut self, bind: String) -> Self {
        self.bind = Some(bind);
        self
    }

    /// Set endpoint override
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Set poll interval override
    #[must_use]
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    /// Set max poll attempts override
    #[must_use]
    pub fn with_poll_max_attempts(mut self, attempts: u32) -> Self {
        self.poll_max_attempts = Some(attempts);
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ParleyConfig) {
        if self.assistant_id.is_some()
            || self.bind.is_some()
            || self.endpoint.is_some()
            || self.poll_interval_ms.is_some()
            || self.poll_max_attempts.is_some()
        {
            config.source = ConfigSource::Cli;
        }

        if let Some(ref id) = self.assistant_id {
            config.assistant.assistant_id = Some(id.clone());
            config.assistant_id_source = ConfigSource::Cli;
        }
        if let Some(ref bind) = self.bind {
            config.server.bind.clone_from(bind);
        }
        if let Some(ref endpoint) = self.endpoint {
            config.client.endpoint.clone_from(endpoint);
        }
        if let Some(ms) = self.poll_interval_ms {
            config.polling.interval = Duration::from_millis(ms);
        }
        if let Some(attempts) = self.poll_max_attempts {
            config.polling.max_attempts = Some(attempts);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
