//! CLI-specific error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::query::QueryError;

/// CLI error
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid JSON in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unknown log level: {0}")]
    LogLevel(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Boot failed: {0}")]
    Boot(String),
}

impl CliError {
    /// Error code string printed alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "IQL_CLI_CONFIG_ERROR",
            Self::Read { .. } | Self::Parse { .. } | Self::LogLevel(_) => "IQL_CLI_INPUT_ERROR",
            Self::Query(_) => "IQL_CLI_QUERY_FAILED",
            Self::Io(_) => "IQL_CLI_IO_ERROR",
            Self::Boot(_) => "IQL_CLI_BOOT_FAILED",
        }
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;
