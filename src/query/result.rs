//! Result table and its TSV form
//!
//! One line per row: labels, then stats, tab-separated, each line
//! newline-terminated. Tabs and line breaks inside labels are replaced by
//! spaces so the table can always be parsed back.

use serde::Serialize;

use crate::execution::{CommandOutput, GroupStatsRow, TermRow};

use super::errors::{QueryError, QueryResult};

/// One output line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    pub labels: Vec<String>,
    pub stats: Vec<i64>,
}

impl From<GroupStatsRow> for ResultRow {
    fn from(row: GroupStatsRow) -> Self {
        ResultRow {
            labels: row.labels,
            stats: row.stats,
        }
    }
}

impl From<TermRow> for ResultRow {
    fn from(row: TermRow) -> Self {
        let mut labels = row.labels;
        labels.push(row.term.to_string());
        ResultRow {
            labels,
            stats: row.stats,
        }
    }
}

/// Rendered result of one query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultTable {
    pub rows: Vec<ResultRow>,
}

fn clean(label: &str) -> String {
    label.replace(['\t', '\n', '\r'], " ")
}

impl ResultTable {
    /// Table from the last command that produced rows
    pub fn from_outputs(outputs: Vec<CommandOutput>) -> Self {
        let rows = match outputs.into_iter().rev().find(CommandOutput::has_rows) {
            Some(CommandOutput::GroupStats(rows)) => rows.into_iter().map(ResultRow::from).collect(),
            Some(CommandOutput::Terms(rows)) => rows.into_iter().map(ResultRow::from).collect(),
            _ => Vec::new(),
        };
        ResultTable { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep the first `limit` rows
    pub fn truncate(&mut self, limit: Option<u32>) {
        if let Some(limit) = limit {
            self.rows.truncate(limit as usize);
        }
    }

    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            let cells: Vec<String> = row
                .labels
                .iter()
                .map(|l| clean(l))
                .chain(row.stats.iter().map(|s| s.to_string()))
                .collect();
            out.push_str(&cells.join("\t"));
            out.push('\n');
        }
        out
    }

    /// Parse a table whose rows end in `num_stats` stat columns
    pub fn from_tsv(text: &str, num_stats: usize) -> QueryResult<Self> {
        let mut rows = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let cells: Vec<&str> = if line.is_empty() {
                Vec::new()
            } else {
                line.split('\t').collect()
            };
            if cells.len() < num_stats {
                return Err(QueryError::Table(format!(
                    "line {} has {} columns, expected at least {}",
                    number + 1,
                    cells.len(),
                    num_stats
                )));
            }
            let split = cells.len() - num_stats;
            let stats = cells[split..]
                .iter()
                .map(|cell| {
                    cell.parse::<i64>().map_err(|_| {
                        QueryError::Table(format!("line {}: bad stat {:?}", number + 1, cell))
                    })
                })
                .collect::<QueryResult<Vec<i64>>>()?;
            rows.push(ResultRow {
                labels: cells[..split].iter().map(|c| c.to_string()).collect(),
                stats,
            });
        }
        Ok(ResultTable { rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftgs::TermValue;

    fn table() -> ResultTable {
        ResultTable {
            rows: vec![
                ResultRow {
                    labels: vec!["[2015-01-01, 2015-01-02)".into(), "us".into()],
                    stats: vec![3, -1],
                },
                ResultRow {
                    labels: vec!["< 10".into(), "gb".into()],
                    stats: vec![0, 7],
                },
            ],
        }
    }

    #[test]
    fn test_tsv_layout() {
        assert_eq!(
            table().to_tsv(),
            "[2015-01-01, 2015-01-02)\tus\t3\t-1\n< 10\tgb\t0\t7\n"
        );
    }

    #[test]
    fn test_parse_back() {
        let parsed = ResultTable::from_tsv(&table().to_tsv(), 2).unwrap();
        assert_eq!(parsed, table());
    }

    #[test]
    fn test_labels_are_cleaned() {
        let table = ResultTable {
            rows: vec![ResultRow {
                labels: vec!["a\tb\nc".into()],
                stats: vec![1],
            }],
        };
        assert_eq!(table.to_tsv(), "a b c\t1\n");
    }

    #[test]
    fn test_rejects_bad_stats() {
        assert!(ResultTable::from_tsv("us\tx\n", 1).is_err());
        assert!(ResultTable::from_tsv("us\n", 2).is_err());
    }

    #[test]
    fn test_from_outputs_uses_last_rows() {
        let outputs = vec![
            CommandOutput::None,
            CommandOutput::Terms(vec![TermRow {
                group: 1,
                labels: vec!["a".into()],
                term: TermValue::Int(5),
                stats: vec![2],
            }]),
            CommandOutput::None,
        ];
        let mut table = ResultTable::from_outputs(outputs);
        assert_eq!(table.rows[0].labels, vec!["a", "5"]);
        table.truncate(Some(0));
        assert!(table.is_empty());
    }
}
