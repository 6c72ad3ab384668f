//! Filter actions
//!
//! Every action moves documents of one `target` group to `positive` on a
//! match and to `negative` otherwise. Documents in other groups, and
//! datasets outside the action's scope, are left alone.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::session::{DocQuery, DocStat, ImhotepSession, QueryRemapRule, SessionInfo};

use super::errors::{ExecutionError, ExecutionResult};

/// One targeted filter step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Int field has any of `terms`
    IntOr {
        scope: BTreeSet<String>,
        field: String,
        terms: BTreeSet<i64>,
        target: u32,
        positive: u32,
        negative: u32,
    },
    /// String field has any of `terms`
    StringOr {
        scope: BTreeSet<String>,
        field: String,
        terms: BTreeSet<String>,
        target: u32,
        positive: u32,
        negative: u32,
    },
    /// Per-dataset document predicate; every dataset in scope needs one
    Query {
        scope: BTreeSet<String>,
        per_dataset: BTreeMap<String, DocQuery>,
        target: u32,
        positive: u32,
        negative: u32,
    },
    /// Per-dataset 0/1 metric; documents evaluating to 1 match
    Metric {
        scope: BTreeSet<String>,
        per_dataset: BTreeMap<String, DocStat>,
        target: u32,
        positive: u32,
        negative: u32,
    },
    /// Some term of the string field fully matches `regex`
    Regex {
        scope: BTreeSet<String>,
        field: String,
        regex: String,
        target: u32,
        positive: u32,
        negative: u32,
    },
    /// Deterministic per-term sample
    Sample {
        scope: BTreeSet<String>,
        field: String,
        probability: f64,
        seed: String,
        target: u32,
        positive: u32,
        negative: u32,
    },
    /// Move the whole target group
    Unconditional {
        scope: BTreeSet<String>,
        target: u32,
        new_group: u32,
    },
}

impl Action {
    pub fn scope(&self) -> &BTreeSet<String> {
        match self {
            Action::IntOr { scope, .. }
            | Action::StringOr { scope, .. }
            | Action::Query { scope, .. }
            | Action::Metric { scope, .. }
            | Action::Regex { scope, .. }
            | Action::Sample { scope, .. }
            | Action::Unconditional { scope, .. } => scope,
        }
    }

    pub fn in_scope(&self, dataset: &str) -> bool {
        self.scope().contains(dataset)
    }

    /// Largest group id this action reads or writes
    pub fn max_group(&self) -> u32 {
        match self {
            Action::Unconditional {
                target, new_group, ..
            } => (*target).max(*new_group),
            Action::IntOr {
                target,
                positive,
                negative,
                ..
            }
            | Action::StringOr {
                target,
                positive,
                negative,
                ..
            }
            | Action::Query {
                target,
                positive,
                negative,
                ..
            }
            | Action::Metric {
                target,
                positive,
                negative,
                ..
            }
            | Action::Regex {
                target,
                positive,
                negative,
                ..
            }
            | Action::Sample {
                target,
                positive,
                negative,
                ..
            } => (*target).max(*positive).max(*negative),
        }
    }

    /// Run this action against one dataset's session
    pub fn apply(
        &self,
        dataset: &str,
        info: &SessionInfo,
        session: &mut dyn ImhotepSession,
    ) -> ExecutionResult<()> {
        if !self.in_scope(dataset) {
            return Ok(());
        }
        match self {
            Action::IntOr {
                field,
                terms,
                target,
                positive,
                negative,
                ..
            } => {
                if info.field_is_int(field) == Some(false) {
                    let terms: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
                    session.string_or_regroup(field, &terms, *target, *negative, *positive)?;
                } else {
                    let terms: Vec<i64> = terms.iter().copied().collect();
                    session.int_or_regroup(field, &terms, *target, *negative, *positive)?;
                }
            }
            Action::StringOr {
                field,
                terms,
                target,
                positive,
                negative,
                ..
            } => {
                let terms: Vec<String> = terms.iter().cloned().collect();
                session.string_or_regroup(field, &terms, *target, *negative, *positive)?;
            }
            Action::Query {
                per_dataset,
                target,
                positive,
                negative,
                ..
            } => {
                let query = per_dataset.get(dataset).ok_or_else(|| {
                    ExecutionError::invalid_command(format!("no query for dataset {}", dataset))
                })?;
                session.query_regroup(&QueryRemapRule {
                    target: *target,
                    query: query.clone(),
                    negative: *negative,
                    positive: *positive,
                })?;
            }
            Action::Metric {
                per_dataset,
                target,
                positive,
                negative,
                ..
            } => {
                let stat = per_dataset.get(dataset).ok_or_else(|| {
                    ExecutionError::invalid_command(format!("no metric for dataset {}", dataset))
                })?;
                let depth = session.push_stat(stat)?;
                let filtered =
                    session.metric_filter(depth - 1, 1, 1, *target, *negative, *positive);
                session.pop_stat()?;
                filtered?;
            }
            Action::Regex {
                field,
                regex,
                target,
                positive,
                negative,
                ..
            } => {
                session.regex_regroup(field, regex, *target, *negative, *positive)?;
            }
            Action::Sample {
                field,
                probability,
                seed,
                target,
                positive,
                negative,
                ..
            } => {
                let is_int = info.field_is_int(field).unwrap_or(false);
                session.random_regroup(
                    field,
                    is_int,
                    seed,
                    *probability,
                    *target,
                    *negative,
                    *positive,
                )?;
            }
            Action::Unconditional {
                target, new_group, ..
            } => {
                session.query_regroup(&QueryRemapRule {
                    target: *target,
                    query: DocQuery::All,
                    negative: *new_group,
                    positive: *new_group,
                })?;
            }
        }
        Ok(())
    }
}

pub(crate) fn fmt_list<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl IntoIterator<Item = T>,
) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    write!(f, "]")
}

/// String items are written quoted and escaped so that no item can
/// swallow a separator.
pub(crate) fn fmt_quoted_list<'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl IntoIterator<Item = &'a String>,
) -> fmt::Result {
    write!(f, "[")?;
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{:?}", item)?;
    }
    write!(f, "]")
}

pub(crate) fn fmt_map<V: fmt::Display>(f: &mut fmt::Formatter<'_>, map: &BTreeMap<String, V>) -> fmt::Result {
    write!(f, "{{")?;
    for (i, (k, v)) in map.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}={}", k, v)?;
    }
    write!(f, "}}")
}

fn fmt_groups(f: &mut fmt::Formatter<'_>, target: u32, positive: u32, negative: u32) -> fmt::Result {
    write!(
        f,
        ", targetGroup={}, positiveGroup={}, negativeGroup={}}}",
        target, positive, negative
    )
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::IntOr {
                scope,
                field,
                terms,
                target,
                positive,
                negative,
            } => {
                write!(f, "IntOrAction{{scope=")?;
                fmt_quoted_list(f, scope)?;
                write!(f, ", field={}, terms=", field)?;
                fmt_list(f, terms)?;
                fmt_groups(f, *target, *positive, *negative)
            }
            Action::StringOr {
                scope,
                field,
                terms,
                target,
                positive,
                negative,
            } => {
                write!(f, "StringOrAction{{scope=")?;
                fmt_quoted_list(f, scope)?;
                write!(f, ", field={}, terms=", field)?;
                fmt_quoted_list(f, terms)?;
                fmt_groups(f, *target, *positive, *negative)
            }
            Action::Query {
                scope,
                per_dataset,
                target,
                positive,
                negative,
            } => {
                write!(f, "QueryAction{{scope=")?;
                fmt_quoted_list(f, scope)?;
                write!(f, ", perDatasetQuery=")?;
                fmt_map(f, per_dataset)?;
                fmt_groups(f, *target, *positive, *negative)
            }
            Action::Metric {
                scope,
                per_dataset,
                target,
                positive,
                negative,
            } => {
                write!(f, "MetricAction{{scope=")?;
                fmt_quoted_list(f, scope)?;
                write!(f, ", filter=")?;
                fmt_map(f, per_dataset)?;
                fmt_groups(f, *target, *positive, *negative)
            }
            Action::Regex {
                scope,
                field,
                regex,
                target,
                positive,
                negative,
            } => {
                write!(f, "RegexAction{{scope=")?;
                fmt_quoted_list(f, scope)?;
                write!(f, ", field='{}', regex='{}'", field, regex)?;
                fmt_groups(f, *target, *positive, *negative)
            }
            Action::Sample {
                scope,
                field,
                probability,
                seed,
                target,
                positive,
                negative,
            } => {
                write!(f, "SampleAction{{scope=")?;
                fmt_quoted_list(f, scope)?;
                write!(
                    f,
                    ", field='{}', probability={:?}, seed='{}'",
                    field, probability, seed
                )?;
                fmt_groups(f, *target, *positive, *negative)
            }
            Action::Unconditional {
                scope,
                target,
                new_group,
            } => {
                write!(f, "UnconditionalAction{{scope=")?;
                fmt_quoted_list(f, scope)?;
                write!(f, ", targetGroup={}, newGroup={}}}", target, new_group)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Document, InMemoryIndex, InMemorySession};

    fn scope(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    fn index() -> InMemoryIndex {
        InMemoryIndex::new()
            .with_doc(Document::new().int("tier", 1).string("country", "us"))
            .with_doc(Document::new().int("tier", 2).string("country", "gb"))
            .with_doc(Document::new().int("tier", 3).string("country", "jp"))
    }

    fn run(action: &Action, dataset: &str) -> Vec<u32> {
        let mut session = InMemorySession::open(dataset, &index(), 0, 1);
        let info = session.info();
        action.apply(dataset, &info, &mut session).unwrap();
        session.groups().to_vec()
    }

    #[test]
    fn test_int_or_splits_target() {
        let action = Action::IntOr {
            scope: scope(&["jobs"]),
            field: "tier".into(),
            terms: [1, 3].into_iter().collect(),
            target: 1,
            positive: 1,
            negative: 0,
        };
        assert_eq!(run(&action, "jobs"), vec![1, 0, 1]);
    }

    #[test]
    fn test_out_of_scope_is_noop() {
        let action = Action::StringOr {
            scope: scope(&["other"]),
            field: "country".into(),
            terms: scope(&["us"]),
            target: 1,
            positive: 1,
            negative: 0,
        };
        assert_eq!(run(&action, "jobs"), vec![1, 1, 1]);
    }

    #[test]
    fn test_int_or_on_string_field_uses_string_terms() {
        let index = InMemoryIndex::new()
            .with_doc(Document::new().string("code", "7"))
            .with_doc(Document::new().string("code", "8"));
        let mut session = InMemorySession::open("jobs", &index, 0, 1);
        let info = session.info();
        let action = Action::IntOr {
            scope: scope(&["jobs"]),
            field: "code".into(),
            terms: [7].into_iter().collect(),
            target: 1,
            positive: 1,
            negative: 0,
        };
        action.apply("jobs", &info, &mut session).unwrap();
        assert_eq!(session.groups(), &[1, 0]);
    }

    #[test]
    fn test_metric_action_pops_its_stat() {
        let action = Action::Metric {
            scope: scope(&["jobs"]),
            per_dataset: [(
                "jobs".to_string(),
                DocStat::HasString {
                    field: "country".into(),
                    term: "gb".into(),
                },
            )]
            .into_iter()
            .collect(),
            target: 1,
            positive: 1,
            negative: 0,
        };
        let mut session = InMemorySession::open("jobs", &index(), 0, 1);
        let info = session.info();
        action.apply("jobs", &info, &mut session).unwrap();
        assert_eq!(session.groups(), &[0, 1, 0]);
        assert_eq!(session.num_stats(), 0);
    }

    #[test]
    fn test_query_action_requires_dataset_query() {
        let action = Action::Query {
            scope: scope(&["jobs"]),
            per_dataset: BTreeMap::new(),
            target: 1,
            positive: 1,
            negative: 0,
        };
        let mut session = InMemorySession::open("jobs", &index(), 0, 1);
        let info = session.info();
        let err = action.apply("jobs", &info, &mut session).unwrap_err();
        assert_eq!(err.code(), super::super::errors::ExecutionErrorCode::InvalidCommand);
    }

    #[test]
    fn test_regex_full_match() {
        let action = Action::Regex {
            scope: scope(&["jobs"]),
            field: "country".into(),
            regex: "u.".into(),
            target: 1,
            positive: 1,
            negative: 0,
        };
        assert_eq!(run(&action, "jobs"), vec![1, 0, 0]);
    }

    #[test]
    fn test_unconditional_moves_whole_group() {
        let action = Action::Unconditional {
            scope: scope(&["jobs"]),
            target: 1,
            new_group: 0,
        };
        assert_eq!(run(&action, "jobs"), vec![0, 0, 0]);
        assert_eq!(action.max_group(), 1);
    }

    #[test]
    fn test_display_forms() {
        let action = Action::IntOr {
            scope: scope(&["b", "a"]),
            field: "tier".into(),
            terms: [2, 1].into_iter().collect(),
            target: 1,
            positive: 1,
            negative: 0,
        };
        assert_eq!(
            action.to_string(),
            "IntOrAction{scope=[\"a\", \"b\"], field=tier, terms=[1, 2], targetGroup=1, positiveGroup=1, negativeGroup=0}"
        );
        let sample = Action::Sample {
            scope: scope(&["a"]),
            field: "country".into(),
            probability: 0.5,
            seed: "s".into(),
            target: 1,
            positive: 1,
            negative: 0,
        };
        assert_eq!(
            sample.to_string(),
            "SampleAction{scope=[\"a\"], field='country', probability=0.5, seed='s', targetGroup=1, positiveGroup=1, negativeGroup=0}"
        );
    }

    #[test]
    fn test_serde_tag() {
        let json = r#"{"action":"unconditional","scope":["a"],"target":2,"new_group":0}"#;
        let action: Action = serde_json::from_str(json).unwrap();
        assert_eq!(
            action,
            Action::Unconditional {
                scope: scope(&["a"]),
                target: 2,
                new_group: 0
            }
        );
    }
}
