//! Pipeline configuration for the orchestration engine.
//!
//! This module provides configuration options for pipeline runs and the
//! served agents, including the quality loop limits, the daily run quota,
//! worker invocation settings, agent endpoints, and storage paths.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for the orchestration engine and served agents.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    // Quality loop settings
    /// Review score a draft must reach to be accepted (0-100).
    pub target_score: u32,
    /// Maximum number of review passes per run.
    pub max_iterations: u32,
    /// Maximum pipeline runs per calendar day.
    pub max_daily_runs: u32,

    // Agent call settings
    /// Read timeout ceiling for each outbound agent call.
    pub agent_read_timeout: Duration,
    /// Registered agent endpoints as `(name, url)` pairs.
    pub agents: Vec<(String, String)>,

    // Worker settings
    /// Worker command line: program followed by its arguments.
    pub worker_cmd: Vec<String>,
    /// Timeout for one worker invocation.
    pub worker_timeout: Duration,

    // Server settings
    /// Host the task protocol servers bind to.
    pub bind_host: String,
    /// API key required on task routes. `None` means no key is configured.
    pub api_key: Option<String>,
    /// Development mode: allows unauthenticated access when no key is set.
    pub dev_mode: bool,
    /// CORS allow-list; empty emits no CORS headers.
    pub allowed_origins: Vec<String>,
    /// Per-client request budget per minute.
    pub rate_limit_per_minute: u32,
    /// Per-client request budget per hour.
    pub rate_limit_per_hour: u32,

    // Storage settings
    /// Directory for quota state and run logs.
    pub state_dir: PathBuf,
    /// Directory for per-run output artifacts.
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            // Quality loop defaults
            target_score: 90,
            max_iterations: 3,
            max_daily_runs: 3,

            // Agent call defaults
            agent_read_timeout: Duration::from_secs(600),
            agents: Vec::new(),

            // Worker defaults
            worker_cmd: vec!["claude".to_string(), "-p".to_string()],
            worker_timeout: Duration::from_secs(300),

            // Server defaults
            bind_host: "127.0.0.1".to_string(),
            api_key: None,
            dev_mode: false,
            allowed_origins: Vec::new(),
            rate_limit_per_minute: 60,
            rate_limit_per_hour: 500,

            // Storage defaults
            state_dir: PathBuf::from("./state"),
            output_dir: PathBuf::from("./output"),
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FORGE_TARGET_SCORE`: Acceptance score (default: 90)
    /// - `FORGE_MAX_ITERATIONS`: Review passes per run (default: 3)
    /// - `FORGE_MAX_DAILY_RUNS`: Daily run quota (default: 3)
    /// - `FORGE_AGENT_READ_TIMEOUT_SECS`: Outbound call timeout (default: 600)
    /// - `FORGE_AGENTS`: Comma-separated `name=url` registrations
    /// - `FORGE_WORKER_CMD`: Worker command line (default: `claude -p`)
    /// - `FORGE_WORKER_TIMEOUT_SECS`: Worker timeout (default: 300)
    /// - `FORGE_BIND_HOST`: Server bind host (default: 127.0.0.1)
    /// - `FORGE_API_KEY`: API key for task routes
    /// - `FORGE_DEV_MODE`: Allow unauthenticated access (default: false)
    /// - `FORGE_ALLOWED_ORIGINS`: Comma-separated CORS origins
    /// - `FORGE_RATE_LIMIT_PER_MINUTE`: Per-client budget (default: 60)
    /// - `FORGE_RATE_LIMIT_PER_HOUR`: Per-client budget (default: 500)
    /// - `FORGE_STATE_DIR`: Quota and run-log directory (default: ./state)
    /// - `FORGE_OUTPUT_DIR`: Run output directory (default: ./output)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Quality loop settings
        if let Ok(val) = std::env::var("FORGE_TARGET_SCORE") {
            config.target_score = parse_env_value(&val, "FORGE_TARGET_SCORE")?;
        }

        if let Ok(val) = std::env::var("FORGE_MAX_ITERATIONS") {
            config.max_iterations = parse_env_value(&val, "FORGE_MAX_ITERATIONS")?;
        }

        if let Ok(val) = std::env::var("FORGE_MAX_DAILY_RUNS") {
            config.max_daily_runs = parse_env_value(&val, "FORGE_MAX_DAILY_RUNS")?;
        }

        // Agent call settings
        if let Ok(val) = std::env::var("FORGE_AGENT_READ_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORGE_AGENT_READ_TIMEOUT_SECS")?;
            config.agent_read_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("FORGE_AGENTS") {
            config.agents = parse_agent_list(&val)?;
        }

        // Worker settings
        if let Ok(val) = std::env::var("FORGE_WORKER_CMD") {
            config.worker_cmd = val.split_whitespace().map(str::to_string).collect();
        }

        if let Ok(val) = std::env::var("FORGE_WORKER_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "FORGE_WORKER_TIMEOUT_SECS")?;
            config.worker_timeout = Duration::from_secs(secs);
        }

        // Server settings
        if let Ok(val) = std::env::var("FORGE_BIND_HOST") {
            config.bind_host = val;
        }

        if let Ok(val) = std::env::var("FORGE_API_KEY") {
            if !val.is_empty() {
                config.api_key = Some(val);
            }
        }

        if let Ok(val) = std::env::var("FORGE_DEV_MODE") {
            config.dev_mode = parse_env_bool(&val, "FORGE_DEV_MODE")?;
        }

        if let Ok(val) = std::env::var("FORGE_ALLOWED_ORIGINS") {
            config.allowed_origins = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(val) = std::env::var("FORGE_RATE_LIMIT_PER_MINUTE") {
            config.rate_limit_per_minute = parse_env_value(&val, "FORGE_RATE_LIMIT_PER_MINUTE")?;
        }

        if let Ok(val) = std::env::var("FORGE_RATE_LIMIT_PER_HOUR") {
            config.rate_limit_per_hour = parse_env_value(&val, "FORGE_RATE_LIMIT_PER_HOUR")?;
        }

        // Storage settings
        if let Ok(val) = std::env::var("FORGE_STATE_DIR") {
            config.state_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("FORGE_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(val);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_score > 100 {
            return Err(ConfigError::ValidationFailed(
                "target_score must be between 0 and 100".to_string(),
            ));
        }

        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_iterations must be greater than 0".to_string(),
            ));
        }

        if self.max_daily_runs == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_daily_runs must be greater than 0".to_string(),
            ));
        }

        if self.agent_read_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "agent_read_timeout must be greater than 0".to_string(),
            ));
        }

        if self.worker_cmd.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "worker_cmd cannot be empty".to_string(),
            ));
        }

        if self.worker_timeout.as_secs() == 0 {
            return Err(ConfigError::ValidationFailed(
                "worker_timeout must be greater than 0".to_string(),
            ));
        }

        if self.bind_host.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "bind_host cannot be empty".to_string(),
            ));
        }

        if self.rate_limit_per_minute == 0 || self.rate_limit_per_hour == 0 {
            return Err(ConfigError::ValidationFailed(
                "rate limits must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the acceptance score.
    pub fn with_target_score(mut self, score: u32) -> Self {
        self.target_score = score;
        self
    }

    /// Builder method to set the review pass limit.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    /// Builder method to set the daily run quota.
    pub fn with_max_daily_runs(mut self, max: u32) -> Self {
        self.max_daily_runs = max;
        self
    }

    /// Builder method to set the outbound read timeout.
    pub fn with_agent_read_timeout(mut self, timeout: Duration) -> Self {
        self.agent_read_timeout = timeout;
        self
    }

    /// Builder method to register an agent endpoint.
    pub fn with_agent(mut self, name: impl Into<String>, url: impl Into<String>) -> Self {
        self.agents.push((name.into(), url.into()));
        self
    }

    /// Builder method to set the worker command line.
    pub fn with_worker_cmd(mut self, cmd: Vec<String>) -> Self {
        self.worker_cmd = cmd;
        self
    }

    /// Builder method to set the worker timeout.
    pub fn with_worker_timeout(mut self, timeout: Duration) -> Self {
        self.worker_timeout = timeout;
        self
    }

    /// Builder method to set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Builder method to enable or disable development mode.
    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    /// Builder method to set the state directory.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    /// Builder method to set the output directory.
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }
}

/// Parses a typed value from an environment variable string.
fn parse_env_value<T: std::str::FromStr>(val: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    val.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

/// Parses a boolean from common truthy/falsy spellings.
fn parse_env_bool(val: &str, key: &str) -> Result<bool, ConfigError> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{}'", val),
        }),
    }
}

/// Parses a comma-separated `name=url` list.
fn parse_agent_list(val: &str) -> Result<Vec<(String, String)>, ConfigError> {
    val.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .split_once('=')
                .map(|(name, url)| (name.trim().to_string(), url.trim().to_string()))
                .filter(|(name, url)| !name.is_empty() && !url.is_empty())
                .ok_or_else(|| ConfigError::InvalidValue {
                    key: "FORGE_AGENTS".to_string(),
                    message: format!("expected name=url, got '{}'", entry),
                })
        })
        .collect()
}
