//! Compiled query handed to the engine by the optimizer

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheKey, CacheKeyInput, DatasetFingerprint, ShardFingerprint};
use crate::execution::Command;
use crate::session::FieldAlias;

use super::errors::{QueryError, QueryResult};

fn default_result_format() -> String {
    "tsv".to_string()
}

/// One dataset the query reads, with its time window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDataset {
    pub name: String,
    pub start_millis: i64,
    pub end_millis: i64,
    #[serde(default)]
    pub aliases: Vec<FieldAlias>,
    /// Resolved shard list; absent when shards are resolved remotely
    #[serde(default)]
    pub shards: Option<Vec<ShardFingerprint>>,
}

/// Ordered command list plus per-dataset scope metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub commands: Vec<Command>,
    pub datasets: Vec<QueryDataset>,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub row_limit: Option<u32>,
    #[serde(default = "default_result_format")]
    pub result_format: String,
    #[serde(default)]
    pub legacy: bool,
}

impl Query {
    pub fn from_json(content: &str) -> QueryResult<Self> {
        let query: Query =
            serde_json::from_str(content).map_err(|e| QueryError::Invalid(e.to_string()))?;
        query.validate()?;
        Ok(query)
    }

    /// Reject queries the engine cannot run
    pub fn validate(&self) -> QueryResult<()> {
        if self.datasets.is_empty() {
            return Err(QueryError::Invalid("query names no datasets".to_string()));
        }
        let mut seen = BTreeSet::new();
        for dataset in &self.datasets {
            if !seen.insert(dataset.name.as_str()) {
                return Err(QueryError::Invalid(format!(
                    "dataset {} listed twice",
                    dataset.name
                )));
            }
            if dataset.start_millis >= dataset.end_millis {
                return Err(QueryError::Invalid(format!(
                    "dataset {} has an empty time range [{}, {})",
                    dataset.name, dataset.start_millis, dataset.end_millis
                )));
            }
        }
        if self.result_format != "tsv" {
            return Err(QueryError::Invalid(format!(
                "unsupported result format {}",
                self.result_format
            )));
        }
        Ok(())
    }

    /// Whether `option` was passed, ignoring case
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o.eq_ignore_ascii_case(option))
    }

    /// Stat columns in the final result, if any command produces rows
    pub fn num_stats(&self) -> Option<usize> {
        self.commands.iter().rev().find_map(Command::num_stats)
    }

    pub fn cache_key_input(&self) -> CacheKeyInput {
        CacheKeyInput {
            legacy: self.legacy,
            result_format: self.result_format.clone(),
            commands: self.commands.iter().map(|c| c.to_string()).collect(),
            datasets: self
                .datasets
                .iter()
                .map(|d| DatasetFingerprint {
                    name: d.name.clone(),
                    start_millis: d.start_millis,
                    end_millis: d.end_millis,
                    aliases: d.aliases.clone(),
                    shards: d.shards.clone(),
                })
                .collect(),
            options: self.options.clone(),
            row_limit: self.row_limit,
        }
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::compute(&self.cache_key_input())
    }
}
