//! Configuration for Hermes.
//!
//! Sources are layered, later ones winning:
//! 1. the defaults embedded from `config/default.toml`
//! 2. a TOML file (an explicit `--config` path, or `~/.config/hermes/config.toml`)
//! 3. `HERMES_<SECTION>__<KEY>` environment variables

use anyhow::{Context, Result};
use config::{Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Embedded default configuration.
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "HERMES";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub workflow: WorkflowConfig,
    pub prompts: PromptsConfig,
    pub logging: LoggingConfig,
}

/// Which model endpoint the invoker talks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Label reported in responses and logs
    pub name: String,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub request_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: None,
            request_timeout_secs: 120,
        }
    }
}

/// Scheduler settings for the workflow engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Upper bound on concurrently running stages
    pub max_parallelism: usize,
    /// Per-stage timeout; an expired stage counts as failed
    pub stage_timeout_secs: u64,
    /// Surface the first stage failure as an error instead of state data
    pub strict: bool,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_parallelism: 5,
            stage_timeout_secs: 300,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// JSON prompt library overriding the built-in templates
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_path: Option<String>,
}

impl PromptsConfig {
    /// Library path with `~` and environment variables expanded.
    pub fn resolved_library_path(&self) -> Option<PathBuf> {
        self.library_path.as_deref().map(expand_path)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Rejected configuration values.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("API key environment variable '{0}' is not set")]
    MissingApiKey(String),
}

impl Config {
    /// Load configuration using the standard sources.
    ///
    /// An explicit `path` must exist; the per-user default file is optional.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let explicit = path.map(expand_path);
        Self::load_from(explicit.as_deref(), ENV_PREFIX)
    }

    /// Load configuration from an optional file and a custom environment prefix.
    pub fn load_from(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder =
            config::Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        match path {
            Some(path) => {
                builder = builder.add_source(
                    File::from(path.to_path_buf())
                        .format(FileFormat::Toml)
                        .required(true),
                );
            }
            None => {
                if let Some(default_path) = Self::default_path() {
                    builder = builder.add_source(
                        File::from(default_path)
                            .format(FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        let settings = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Per-user configuration file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hermes").join("config.toml"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workflow.max_parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workflow.max_parallelism",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.workflow.stage_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "workflow.stage_timeout_secs",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "provider.temperature",
                reason: format!("{} is outside [0, 2]", self.provider.temperature),
            });
        }
        Ok(())
    }

    /// Read the provider API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.provider.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.provider.api_key_env.clone()))
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }
}

fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());
    PathBuf::from(expanded)
}
