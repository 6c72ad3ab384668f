//! CLI command implementations
//!
//! `run` boots a tokio runtime, opens the fixture indexes through an
//! in-memory opener and prints the result table to stdout. Logs go to the
//! structured logger; progress events, when asked for, go to stderr.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::observability::{log_event_with_fields, Event, Logger, Severity};
use crate::progress::{EventStreamProgress, LoggingProgress, ProgressCallback};
use crate::query::{Query, QueryExecutor};
use crate::session::{InMemoryIndex, InMemoryOpener};

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Fixture file: in-memory indexes by dataset name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixture {
    pub datasets: BTreeMap<String, InMemoryIndex>,
}

impl Fixture {
    pub fn load(path: &Path) -> CliResult<Self> {
        load_json(path)
    }

    pub fn into_opener(self) -> InMemoryOpener {
        self.datasets
            .into_iter()
            .fold(InMemoryOpener::new(), |opener, (name, index)| {
                opener.with_index(name, index)
            })
    }
}

fn load_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let content = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn load_query(path: &Path) -> CliResult<Query> {
    let query: Query = load_json(path)?;
    query.validate()?;
    Ok(query)
}

/// Parse CLI args and run the command
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Run {
            config,
            index,
            query,
            log_level,
            progress,
        } => {
            let severity =
                Severity::parse(&log_level).ok_or_else(|| CliError::LogLevel(log_level.clone()))?;
            Logger::set_min_severity(severity);
            let config = match config {
                Some(path) => EngineConfig::load(&path)?,
                None => EngineConfig::default(),
            };
            let tsv = run_query(config, &index, &query, progress)?;
            let mut out = io::stdout().lock();
            out.write_all(tsv.as_bytes())?;
            out.flush()?;
            Ok(())
        }
        Command::CacheKey { query } => {
            let line = cache_key(&query)?;
            println!("{}", line);
            Ok(())
        }
    }
}

/// Execute one query file against one fixture file, returning TSV
pub fn run_query(
    config: EngineConfig,
    index_path: &Path,
    query_path: &Path,
    progress: bool,
) -> CliResult<String> {
    let group_limit = config.group_limit.to_string();
    let parallelism = config.max_parallelism.to_string();
    log_event_with_fields(
        Event::ConfigLoaded,
        &[
            ("group_limit", group_limit.as_str()),
            ("max_parallelism", parallelism.as_str()),
        ],
    );

    let opener = Fixture::load(index_path)?.into_opener();
    let query = load_query(query_path)?;
    let executor = QueryExecutor::new(config, Arc::new(opener))?;

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Boot(format!("Failed to create tokio runtime: {}", e)))?;

    let outcome = if progress {
        let callback = EventStreamProgress::new(io::stderr(), true);
        rt.block_on(executor.execute(&query, &callback as &dyn ProgressCallback))?
    } else {
        rt.block_on(executor.execute(&query, &LoggingProgress))?
    };
    Ok(outcome.table.to_tsv())
}

/// `<digest>\t<file name>` for a query file
pub fn cache_key(query_path: &Path) -> CliResult<String> {
    let key = load_query(query_path)?.cache_key();
    Ok(format!("{}\t{}", key.digest, key.file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FIXTURE: &str = r#"{
        "datasets": {
            "jobs": {"docs": [
                {"ints": {"tier": [1]}, "strings": {}},
                {"ints": {"tier": [2]}, "strings": {}},
                {"ints": {"tier": [2]}, "strings": {}}
            ]}
        }
    }"#;

    const QUERY: &str = r#"{
        "commands": [
            {"command": "int_regroup_field_in", "field": "tier", "terms": [1, 2]},
            {"command": "get_group_stats", "metrics": [{"type": "count"}]}
        ],
        "datasets": [{"name": "jobs", "start_millis": 0, "end_millis": 1000}]
    }"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_run_query_prints_tsv() {
        let dir = TempDir::new().unwrap();
        let index = write(&dir, "index.json", FIXTURE);
        let query = write(&dir, "query.json", QUERY);

        let tsv = run_query(EngineConfig::default(), &index, &query, false).unwrap();
        assert_eq!(tsv, "1\t1\n2\t2\n");
    }

    #[test]
    fn test_cache_key_line() {
        let dir = TempDir::new().unwrap();
        let query = write(&dir, "query.json", QUERY);
        let line = cache_key(&query).unwrap();
        let (digest, file) = line.split_once('\t').unwrap();
        assert_eq!(file, format!("IQL2-{}.tsv", digest));
    }

    #[test]
    fn test_missing_fixture_is_reported() {
        let dir = TempDir::new().unwrap();
        let query = write(&dir, "query.json", QUERY);
        let err = run_query(
            EngineConfig::default(),
            &dir.path().join("nope.json"),
            &query,
            false,
        )
        .unwrap_err();
        assert_eq!(err.code(), "IQL_CLI_INPUT_ERROR");
    }
}
