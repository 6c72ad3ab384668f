//! CLI module for iqlengine
//!
//! Provides command-line interface for:
//! - run: Execute a compiled query against fixture indexes
//! - cache-key: Print the result cache key of a compiled query

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{cache_key, run, run_command, run_query, Fixture};
pub use errors::{CliError, CliResult};
