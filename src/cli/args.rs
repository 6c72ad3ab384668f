//! CLI argument definitions using clap
//!
//! Commands:
//! - iqlengine run --index <fixture> --query <query> [--config <path>]
//! - iqlengine cache-key --query <query>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// iqlengine - IQL group-key execution engine
#[derive(Parser, Debug)]
#[command(name = "iqlengine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Execute a compiled query against fixture indexes and print TSV
    Run {
        /// Engine configuration; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Fixture file: {"datasets": {"<name>": <index>}}
        #[arg(long)]
        index: PathBuf,

        /// Compiled query JSON
        #[arg(long)]
        query: PathBuf,

        /// Minimum log severity (TRACE, INFO, WARN, ERROR, FATAL)
        #[arg(long, default_value = "WARN")]
        log_level: String,

        /// Write progress events to stderr
        #[arg(long)]
        progress: bool,
    },

    /// Print the result cache key of a compiled query
    CacheKey {
        /// Compiled query JSON
        #[arg(long)]
        query: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
