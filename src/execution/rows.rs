//! Rows produced by the stat-pulling commands

use serde::Serialize;

use crate::ftgs::TermValue;

/// One present group with its summed stats
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupStatsRow {
    pub group: u32,
    pub labels: Vec<String>,
    pub stats: Vec<i64>,
}

/// One (term, group) pair from an FTGS scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermRow {
    pub group: u32,
    pub labels: Vec<String>,
    pub term: TermValue,
    pub stats: Vec<i64>,
}

/// What a command hands back to the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CommandOutput {
    /// Regrouping and filtering commands
    #[default]
    None,
    GroupStats(Vec<GroupStatsRow>),
    Terms(Vec<TermRow>),
}

impl CommandOutput {
    /// True for outputs that carry rows
    pub fn has_rows(&self) -> bool {
        !matches!(self, CommandOutput::None)
    }

    pub fn num_rows(&self) -> usize {
        match self {
            CommandOutput::None => 0,
            CommandOutput::GroupStats(rows) => rows.len(),
            CommandOutput::Terms(rows) => rows.len(),
        }
    }
}
