//! Runtime configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. CLI arguments
//! 2. Environment variables (ACTORCORE_MAX_THREADS, ACTORCORE_POOL_NAME)
//! 3. Config file (TOML)
//! 4. Default values
//! ```
//!
//! # Format
//!
//! ```toml
//! [log]
//! level = "info"
//!
//! [pool]
//! name = "ActorPool"
//! max_threads = 100
//! idle_timeout_ms = 5000
//! max_batch = 100
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::runtime::pool::PoolConfig;
use crate::util::logger::LogLevel;

/// Environment variable overriding `pool.max_threads`
pub const ENV_MAX_THREADS: &str = "ACTORCORE_MAX_THREADS";

/// Environment variable overriding `pool.name`
pub const ENV_POOL_NAME: &str = "ACTORCORE_POOL_NAME";

/// Complete runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
    /// Default actor pool settings
    #[serde(default)]
    pub pool: PoolConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogConfig {
    /// Minimum level emitted
    #[serde(default)]
    pub level: LogLevel,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl RuntimeConfig {
    /// Apply environment overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_from<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_THREADS) {
            self.pool.max_threads = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be an integer, got '{}'", ENV_MAX_THREADS, raw))
            })?;
        }
        if let Some(name) = lookup(ENV_POOL_NAME) {
            self.pool.name = name;
        }
        self.validate()
    }

    /// Check every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Render as pretty TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

/// Parse configuration text. Missing sections and keys take their defaults.
pub fn load_config_str(content: &str) -> Result<RuntimeConfig, ConfigError> {
    let config: RuntimeConfig = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_config_str(&content)
}
