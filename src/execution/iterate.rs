//! Stat-pulling commands
//!
//! Stats are pushed per dataset, read back, and always popped again so a
//! command leaves every session's stat stack as it found it.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::ftgs::{BoxedCursor, FtgsIterator, FtgsRecord, MergingCursor};
use crate::session::{DocStat, ImhotepSession, SessionError};

use super::command::Metric;
use super::errors::{ExecutionError, ExecutionResult};
use super::rows::{GroupStatsRow, TermRow};
use super::session::Session;

/// Push `stats`, run `op` with the index of the first one, pop them all
///
/// Pops run even when `op` fails; the first error wins.
fn with_pushed<T>(
    remote: &mut dyn ImhotepSession,
    stats: &[DocStat],
    op: impl FnOnce(&mut dyn ImhotepSession, usize) -> ExecutionResult<T>,
) -> ExecutionResult<T> {
    let base = remote.num_stats();
    let mut pushed = 0;
    let mut result = Ok(());
    for stat in stats {
        match remote.push_stat(stat) {
            Ok(_) => pushed += 1,
            Err(e) => {
                result = Err(ExecutionError::from(e));
                break;
            }
        }
    }
    let value = result.and_then(|_| op(remote, base));
    let mut popped = Ok(());
    for _ in 0..pushed {
        if let Err(e) = remote.pop_stat() {
            popped = Err(ExecutionError::from(e));
            break;
        }
    }
    let value = value?;
    popped?;
    Ok(value)
}

/// Sum per-dataset vectors element-wise; missing slots count as 0
fn sum_by_group(per_dataset: impl IntoIterator<Item = Vec<i64>>, num_groups: u32) -> Vec<i64> {
    let mut total = vec![0i64; num_groups as usize + 1];
    for stats in per_dataset {
        for (slot, value) in total.iter_mut().zip(stats) {
            *slot = slot.wrapping_add(value);
        }
    }
    total
}

pub(super) async fn densify(session: &mut Session) -> ExecutionResult<()> {
    let num_groups = session.num_groups();
    let counts = session
        .for_each_dataset(None, |_, _, remote| {
            with_pushed(remote, &[DocStat::Count], |remote, index| {
                Ok(remote.group_stats(index)?)
            })
        })
        .await?;
    let total = sum_by_group(counts.into_iter().map(|(_, c)| c), num_groups);
    let present: Vec<bool> = total.iter().map(|count| *count > 0).collect();
    let previous = session.level();
    let level = session.chain_mut().mask(previous, present)?;
    session.set_level(level);
    Ok(())
}

pub(super) async fn get_group_stats(
    session: &mut Session,
    metrics: &[Metric],
) -> ExecutionResult<Vec<GroupStatsRow>> {
    let num_groups = session.num_groups();
    let metrics: Arc<Vec<Metric>> = Arc::new(metrics.to_vec());
    let width = metrics.len();
    let per_dataset = {
        let metrics = Arc::clone(&metrics);
        session
            .for_each_dataset(None, move |name, _, remote| {
                let stats: Vec<DocStat> = metrics.iter().map(|m| m.for_dataset(name)).collect();
                with_pushed(remote, &stats, |remote, base| {
                    (0..stats.len())
                        .map(|i| Ok(remote.group_stats(base + i)?))
                        .collect::<ExecutionResult<Vec<Vec<i64>>>>()
                })
            })
            .await?
    };

    let mut columns: Vec<Vec<i64>> = vec![vec![0; num_groups as usize + 1]; width];
    for (_, stats) in per_dataset {
        for (column, values) in columns.iter_mut().zip(stats) {
            for (slot, value) in column.iter_mut().zip(values) {
                *slot = slot.wrapping_add(value);
            }
        }
    }

    let chain = session.chain();
    let level = session.level();
    let mut rows = Vec::new();
    for group in 1..=num_groups {
        if !chain.is_present(level, group) {
            continue;
        }
        rows.push(GroupStatsRow {
            group,
            labels: chain.labels(level, group)?,
            stats: columns.iter().map(|c| c[group as usize]).collect(),
        });
    }
    Ok(rows)
}

pub(super) async fn simple_iterate(
    session: &mut Session,
    field: &str,
    metrics: &[Metric],
    scope: Option<&BTreeSet<String>>,
) -> ExecutionResult<Vec<TermRow>> {
    let is_int = session
        .infos()
        .iter()
        .filter(|(name, _)| scope.map_or(true, |s| s.contains(*name)))
        .find_map(|(_, info)| info.field_is_int(field))
        .ok_or_else(|| ExecutionError::from(SessionError::UnknownField(field.to_string())))?;

    let stats: Arc<Vec<Metric>> = Arc::new(metrics.to_vec());
    let pushed = {
        let stats = Arc::clone(&stats);
        session
            .for_each_dataset(scope, move |name, _, remote| {
                for metric in stats.iter() {
                    remote.push_stat(&metric.for_dataset(name))?;
                }
                Ok(())
            })
            .await
    };

    let scanned = match pushed {
        Ok(_) => scan(session, field, is_int, scope).await,
        Err(e) => Err(e),
    };

    let width = metrics.len();
    let popped = session
        .for_each_dataset(scope, move |_, _, remote| {
            for _ in 0..width.min(remote.num_stats()) {
                remote.pop_stat()?;
            }
            Ok(())
        })
        .await;

    let records = scanned?;
    popped?;

    let chain = session.chain();
    let level = session.level();
    let mut rows = Vec::with_capacity(records.len());
    for record in records {
        if !chain.is_present(level, record.group) {
            continue;
        }
        rows.push(TermRow {
            group: record.group,
            labels: chain.labels(level, record.group)?,
            term: record.term,
            stats: record.stats,
        });
    }
    Ok(rows)
}

/// Open one cursor per dataset and merge them into owned records
async fn scan(
    session: &Session,
    field: &str,
    is_int: bool,
    scope: Option<&BTreeSet<String>>,
) -> ExecutionResult<Vec<FtgsRecord>> {
    let requested = vec![field.to_string()];
    let cursors = session
        .for_each_dataset(scope, move |_, _, remote| {
            let (ints, strings) = if is_int {
                (requested.as_slice(), &[][..])
            } else {
                (&[][..], requested.as_slice())
            };
            Ok(remote.ftgs_iterator(ints, strings)?)
        })
        .await?;
    let cursors: Vec<BoxedCursor> = cursors.into_iter().map(|(_, c)| c).collect();

    tokio::task::spawn_blocking(move || -> ExecutionResult<Vec<FtgsRecord>> {
        let merged = MergingCursor::new(cursors)?;
        let mut iter = FtgsIterator::records(merged);
        let records: Vec<FtgsRecord> = iter.by_ref().collect();
        if let Some(failure) = iter.cursor().failure() {
            return Err(ExecutionError::invalid_command(failure.to_string()));
        }
        Ok(records)
    })
    .await
    .unwrap_or_else(|e| Err(ExecutionError::internal(format!("ftgs worker failed: {}", e))))
}
