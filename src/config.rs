//! Engine configuration
//!
//! Loaded from a JSON file. Every field has a default so an empty object
//! is a valid configuration; `validate()` rejects values the engine cannot
//! run with.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::groupkeys::offset_from_minutes;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Which store backs the result cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Noop,
    Memory,
    Local,
}

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub backend: CacheBackend,

    /// Directory for the `local` backend
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn memory() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Memory,
            local_dir: None,
        }
    }

    pub fn local(dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Local,
            local_dir: Some(dir.into()),
        }
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.enabled && self.backend == CacheBackend::Local && self.local_dir.is_none() {
            return Err(ConfigError::Invalid(
                "cache.local_dir is required for the local backend".to_string(),
            ));
        }
        Ok(())
    }
}

/// Execution engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Most groups a query may create; 0 disables the check
    #[serde(default = "default_group_limit")]
    pub group_limit: u32,

    /// Concurrent per-dataset operations within one command
    #[serde(default = "default_max_parallelism")]
    pub max_parallelism: usize,

    /// Fixed UTC offset for time bucketing and labels
    #[serde(default = "default_timezone_offset_minutes")]
    pub timezone_offset_minutes: i32,

    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,

    #[serde(default)]
    pub cache: CacheConfig,
}

fn default_group_limit() -> u32 {
    1_000_000
}
fn default_max_parallelism() -> usize {
    8
}
fn default_timezone_offset_minutes() -> i32 {
    -360
} // UTC-6
fn default_query_timeout_ms() -> u64 {
    300_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            group_limit: default_group_limit(),
            max_parallelism: default_max_parallelism(),
            timezone_offset_minutes: default_timezone_offset_minutes(),
            query_timeout_ms: default_query_timeout_ms(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: EngineConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_parallelism == 0 {
            return Err(ConfigError::Invalid("max_parallelism must be > 0".to_string()));
        }
        if self.query_timeout_ms == 0 {
            return Err(ConfigError::Invalid("query_timeout_ms must be > 0".to_string()));
        }
        if self.timezone_offset_minutes.abs() >= 24 * 60 {
            return Err(ConfigError::Invalid(format!(
                "timezone_offset_minutes out of range: {}",
                self.timezone_offset_minutes
            )));
        }
        self.cache.validate()
    }

    /// None when the group limit is disabled
    pub fn effective_group_limit(&self) -> Option<u32> {
        (self.group_limit > 0).then_some(self.group_limit)
    }

    pub fn timezone(&self) -> FixedOffset {
        offset_from_minutes(self.timezone_offset_minutes)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}
