//! Pipeline commands
//!
//! A `Command` is an immutable instruction executed against every
//! dataset of the query. Its `Display` form is stable and feeds the cache
//! key, so changing a format here invalidates cached results.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::groupkeys::{BucketRange, TimeUnit};
use crate::session::DocStat;

use super::action::{fmt_list, fmt_map, fmt_quoted_list, Action};
use super::errors::ExecutionResult;
use super::iterate;
use super::regroup;
use super::rows::CommandOutput;
use super::session::Session;

/// Metric evaluated per dataset
///
/// Either one stat for every dataset or an explicit per-dataset map.
/// Datasets missing from the map contribute 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    All(DocStat),
    PerDataset(BTreeMap<String, DocStat>),
}

impl Metric {
    pub fn for_dataset(&self, dataset: &str) -> DocStat {
        match self {
            Metric::All(stat) => stat.clone(),
            Metric::PerDataset(map) => map
                .get(dataset)
                .cloned()
                .unwrap_or(DocStat::Constant { value: 0 }),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::All(stat) => write!(f, "{}", stat),
            Metric::PerDataset(map) => fmt_map(f, map),
        }
    }
}

/// One pipeline step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Run filter actions in order; group numbering is unchanged
    ApplyFilterActions { actions: Vec<Action> },
    /// Bucket every group by a metric
    MetricRegroup { metric: Metric, range: BucketRange },
    /// Bucket every group by time over `[earliest start, latest end)`
    TimeRegroup {
        unit: TimeUnit,
        /// Bucket width override, a whole number of seconds
        #[serde(default)]
        unit_millis: Option<i64>,
        /// Defaults to each dataset's time field
        #[serde(default)]
        time_field: Option<String>,
    },
    ExplodeDayOfWeek,
    ExplodeMonthOfYear,
    IntRegroupFieldIn {
        field: String,
        terms: Vec<i64>,
        #[serde(default)]
        with_default: bool,
    },
    StringRegroupFieldIn {
        field: String,
        terms: Vec<String>,
        #[serde(default)]
        with_default: bool,
    },
    /// Split every group into sampled and unsampled halves
    SampleFields {
        per_dataset_fields: BTreeMap<String, String>,
        fraction: f64,
        seed: String,
    },
    RegroupIntoParent,
    /// Mark empty groups absent
    Densify,
    GetGroupStats { metrics: Vec<Metric> },
    /// FTGS scan of one field, merged across datasets
    SimpleIterate {
        field: String,
        metrics: Vec<Metric>,
        /// Datasets to scan; all when absent
        #[serde(default)]
        scope: Option<BTreeSet<String>>,
        #[serde(default)]
        streaming: bool,
    },
}

impl Command {
    /// Short name used in logs and progress events
    pub fn name(&self) -> &'static str {
        match self {
            Command::ApplyFilterActions { .. } => "ApplyFilterActions",
            Command::MetricRegroup { .. } => "MetricRegroup",
            Command::TimeRegroup { .. } => "TimeRegroup",
            Command::ExplodeDayOfWeek => "ExplodeDayOfWeek",
            Command::ExplodeMonthOfYear => "ExplodeMonthOfYear",
            Command::IntRegroupFieldIn { .. } => "IntRegroupFieldIn",
            Command::StringRegroupFieldIn { .. } => "StringRegroupFieldIn",
            Command::SampleFields { .. } => "SampleFields",
            Command::RegroupIntoParent => "RegroupIntoParent",
            Command::Densify => "Densify",
            Command::GetGroupStats { .. } => "GetGroupStats",
            Command::SimpleIterate { .. } => "SimpleIterate",
        }
    }

    /// Whether results are streamed to the client as they are produced
    pub fn is_streaming(&self) -> bool {
        matches!(self, Command::SimpleIterate { streaming: true, .. })
    }

    /// Stat columns of the rows this command returns, None for regroups
    pub fn num_stats(&self) -> Option<usize> {
        match self {
            Command::GetGroupStats { metrics } | Command::SimpleIterate { metrics, .. } => {
                Some(metrics.len())
            }
            _ => None,
        }
    }

    /// Execute against every dataset of `session`
    pub async fn execute(&self, session: &mut Session) -> ExecutionResult<CommandOutput> {
        match self {
            Command::ApplyFilterActions { actions } => {
                regroup::apply_filter_actions(session, actions).await?
            }
            Command::MetricRegroup { metric, range } => {
                regroup::metric_regroup(session, metric, range).await?
            }
            Command::TimeRegroup {
                unit,
                unit_millis,
                time_field,
            } => {
                let width = unit_millis.unwrap_or_else(|| unit.millis());
                regroup::time_regroup(session, *unit, width, time_field.as_deref()).await?
            }
            Command::ExplodeDayOfWeek => regroup::explode_day_of_week(session).await?,
            Command::ExplodeMonthOfYear => regroup::explode_month_of_year(session).await?,
            Command::IntRegroupFieldIn {
                field,
                terms,
                with_default,
            } => {
                let terms = terms.iter().map(|t| (*t).into()).collect();
                regroup::regroup_field_in(session, field, terms, true, *with_default).await?
            }
            Command::StringRegroupFieldIn {
                field,
                terms,
                with_default,
            } => {
                let terms = terms.iter().map(|t| t.as_str().into()).collect();
                regroup::regroup_field_in(session, field, terms, false, *with_default).await?
            }
            Command::SampleFields {
                per_dataset_fields,
                fraction,
                seed,
            } => regroup::sample_fields(session, per_dataset_fields, *fraction, seed).await?,
            Command::RegroupIntoParent => regroup::regroup_into_parent(session).await?,
            Command::Densify => iterate::densify(session).await?,
            Command::GetGroupStats { metrics } => {
                return Ok(CommandOutput::GroupStats(
                    iterate::get_group_stats(session, metrics).await?,
                ))
            }
            Command::SimpleIterate {
                field,
                metrics,
                scope,
                ..
            } => {
                return Ok(CommandOutput::Terms(
                    iterate::simple_iterate(session, field, metrics, scope.as_ref()).await?,
                ))
            }
        }
        Ok(CommandOutput::None)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ApplyFilterActions { actions } => {
                write!(f, "ApplyFilterActions{{actions=")?;
                fmt_list(f, actions)?;
                write!(f, "}}")
            }
            Command::MetricRegroup { metric, range } => write!(
                f,
                "MetricRegroup{{metric={}, min={}, max={}, interval={}, gutters={:?}}}",
                metric, range.min, range.max, range.interval, range.gutters
            ),
            Command::TimeRegroup {
                unit,
                unit_millis,
                time_field,
            } => write!(
                f,
                "TimeRegroup{{unit={}, unitMillis={}, timeField={}}}",
                unit,
                unit_millis.unwrap_or_else(|| unit.millis()),
                time_field.as_deref().unwrap_or("")
            ),
            Command::ExplodeDayOfWeek => write!(f, "ExplodeDayOfWeek{{}}"),
            Command::ExplodeMonthOfYear => write!(f, "ExplodeMonthOfYear{{}}"),
            Command::IntRegroupFieldIn {
                field,
                terms,
                with_default,
            } => {
                write!(f, "IntRegroupFieldIn{{field='{}', terms=", field)?;
                fmt_list(f, terms)?;
                write!(f, ", withDefault={}}}", with_default)
            }
            Command::StringRegroupFieldIn {
                field,
                terms,
                with_default,
            } => {
                write!(f, "StringRegroupFieldIn{{field='{}', terms=", field)?;
                fmt_quoted_list(f, terms)?;
                write!(f, ", withDefault={}}}", with_default)
            }
            Command::SampleFields {
                per_dataset_fields,
                fraction,
                seed,
            } => {
                write!(f, "SampleFields{{perDatasetField=")?;
                fmt_map(f, per_dataset_fields)?;
                write!(f, ", fraction={:?}, seed='{}'}}", fraction, seed)
            }
            Command::RegroupIntoParent => write!(f, "RegroupIntoParent{{}}"),
            Command::Densify => write!(f, "Densify{{}}"),
            Command::GetGroupStats { metrics } => {
                write!(f, "GetGroupStats{{metrics=")?;
                fmt_list(f, metrics)?;
                write!(f, "}}")
            }
            Command::SimpleIterate {
                field,
                metrics,
                scope,
                streaming,
            } => {
                write!(f, "SimpleIterate{{field='{}', metrics=", field)?;
                fmt_list(f, metrics)?;
                write!(f, ", scope=")?;
                match scope {
                    Some(scope) => fmt_quoted_list(f, scope)?,
                    None => write!(f, "*")?,
                }
                write!(f, ", streaming={}}}", streaming)
            }
        }
    }
}
