//! Configuration for the endpoint, models, execution limits, fetching and the rubric.

use core::result::Result as CoreResult;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs::home_dir;
use serde::{Deserialize, Deserializer, Serialize};
use toml::{Value, from_str, to_string_pretty};
use tracing::{debug, warn};

use crate::rubric::Rubric;
use crate::types::CallDefaults;
use crate::{Error, Result};

/// Default OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://integrate.api.nvidia.com/v1";
/// Env var holding the endpoint credential.
pub const DEFAULT_API_KEY_ENV: &str = "NVIDIA_API_KEY";

/// Complete process configuration, read once at startup.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrucibleConfig {
    /// Remote endpoint settings
    pub endpoint: EndpointConfig,
    /// Worker and evaluator models
    pub models: ModelsConfig,
    /// Concurrency and iteration limits
    pub execution: ExecutionConfig,
    /// Content fetching for `[FETCH_URL: ...]` directives
    pub fetch: FetchConfig,
    /// Criteria the evaluator checks
    pub rubric: Rubric,
}

/// Remote chat-completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL; `/chat/completions` is appended
    pub base_url: String,
    /// Credential; falls back to `api_key_env` when absent
    pub api_key: Option<String>,
    /// Name of the env var consulted for the credential
    pub api_key_env: String,
    /// Transport timeout for a single model request
    pub request_timeout_seconds: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_owned(),
            request_timeout_seconds: 120,
        }
    }
}

/// Models and sampling defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Model producing answers
    pub worker_model: String,
    /// Model judging answers
    pub evaluator_model: String,
    /// Temperature used when a call does not override it
    pub default_temperature: f32,
    /// Completion budget used when a call does not override it
    pub default_max_tokens: u32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            worker_model: "meta/llama-3.1-70b-instruct".to_owned(),
            evaluator_model: "meta/llama-3.1-70b-instruct".to_owned(),
            default_temperature: 0.6,
            default_max_tokens: 2048,
        }
    }
}

impl ModelsConfig {
    /// Defaults handed to the model gateway.
    pub fn call_defaults(&self) -> CallDefaults {
        CallDefaults {
            temperature: self.default_temperature,
            max_tokens: self.default_max_tokens,
        }
    }
}

/// Concurrency and iteration limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Capacity of the model gateway's gate; invalid values fall back to 1
    #[serde(deserialize_with = "lenient_capacity")]
    pub max_concurrent_calls: Option<i64>,
    /// Upper bound on worker/evaluator rounds per task
    pub max_iterations: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: Some(3),
            max_iterations: 3,
        }
    }
}

/// Reads the gate capacity without failing the whole config on a bad type.
///
/// Anything that is not a TOML integer is reported and read as `None`, which
/// the gate turns into a capacity of 1.
fn lenient_capacity<'de, D>(deserializer: D) -> CoreResult<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Value::Integer(capacity) = value {
        Ok(Some(capacity))
    } else {
        warn!(
            "execution.max_concurrent_calls must be an integer, got {} `{value}`",
            value.type_str()
        );
        Ok(None)
    }
}

/// Content fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout
    pub timeout_seconds: u64,
    /// User agent sent with every fetch
    pub user_agent: String,
    /// Redirects followed before giving up
    pub max_redirects: usize,
    /// Characters of fetched text inlined into a prompt
    pub max_context_chars: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 10,
            user_agent: "Crucible/0.1 (+https://github.com/crucible-llm/crucible)".to_owned(),
            max_redirects: 10,
            max_context_chars: 4000,
        }
    }
}

impl CrucibleConfig {
    /// Get the default config directory path (`~/.crucible`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_dir() -> Result<PathBuf> {
        let home =
            home_dir().ok_or_else(|| Error::Config("Could not determine home directory".to_owned()))?;
        Ok(home.join(".crucible"))
    }

    /// Get the default config file path (`~/.crucible/config.toml`)
    ///
    /// # Errors
    /// Returns an error if the home directory cannot be determined
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location (`~/.crucible/config.toml`)
    /// If the config doesn't exist, creates it with default values
    ///
    /// # Errors
    /// Returns an error if the config cannot be read or created
    pub fn load_or_create() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from_file(&config_path)
        } else {
            let config = Self::default();
            config.save_to_file(&config_path)?;
            Ok(config)
        }
    }

    /// Load config from a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or fails validation
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|error| Error::Config(format!("Failed to read config: {error}")))?;
        let config: Self = from_str(&contents)?;
        config.validate()?;

        debug!(
            "Loaded config from {:?}: api_key={}, rubric_criteria={}",
            path,
            if config.endpoint.api_key.is_some() {
                "present"
            } else {
                "missing"
            },
            config.rubric.len()
        );

        Ok(config)
    }

    /// Save config to a specific file
    ///
    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = to_string_pretty(self)
            .map_err(|error| Error::Config(format!("Failed to serialize config: {error}")))?;

        let header = "# Crucible Configuration File\n\
                      # This file is automatically generated on first run\n\
                      # Edit this file to customize your settings\n\n";

        fs::write(path, format!("{header}{contents}"))?;

        Ok(())
    }

    /// Checks values that have no sensible fallback.
    ///
    /// # Errors
    /// Returns an error for a zero iteration cap, empty model ids or an empty rubric
    pub fn validate(&self) -> Result<()> {
        if self.execution.max_iterations == 0 {
            return Err(Error::Config(
                "execution.max_iterations must be at least 1".to_owned(),
            ));
        }
        if self.models.worker_model.trim().is_empty() {
            return Err(Error::Config("models.worker_model is empty".to_owned()));
        }
        if self.models.evaluator_model.trim().is_empty() {
            return Err(Error::Config("models.evaluator_model is empty".to_owned()));
        }
        if self.rubric.is_empty() {
            return Err(Error::Config("rubric has no criteria".to_owned()));
        }
        Ok(())
    }

    /// Endpoint credential, checking config first, then the environment
    pub fn api_key(&self) -> Option<String> {
        self.endpoint
            .api_key
            .clone()
            .or_else(|| env::var(&self.endpoint.api_key_env).ok())
            .filter(|key| !key.trim().is_empty())
    }
}
