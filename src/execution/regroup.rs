//! Regrouping commands
//!
//! Each function fans one remote operation out over the datasets, then
//! records the new level in the group key chain. Levels are only added
//! after every dataset has regrouped successfully.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone};

use crate::ftgs::TermValue;
use crate::groupkeys::{at_offset, day_millis, BucketRange, GroupKey, GutterMode, TimeUnit};
use crate::session::{
    DocStat, GroupMultiRemapRule, GroupRemapRule, RegroupCondition, SessionError,
};

use super::action::Action;
use super::command::Metric;
use super::errors::{ExecutionError, ExecutionResult};
use super::session::Session;

const SAMPLED: &str = "sampled";
const UNSAMPLED: &str = "unsampled";

pub(super) async fn apply_filter_actions(
    session: &mut Session,
    actions: &[Action],
) -> ExecutionResult<()> {
    let num_groups = session.num_groups();
    if let Some(bad) = actions.iter().find(|a| a.max_group() > num_groups) {
        return Err(ExecutionError::invalid_command(format!(
            "action references group {} but only {} exist: {}",
            bad.max_group(),
            num_groups,
            bad
        )));
    }
    let actions: Arc<Vec<Action>> = Arc::new(actions.to_vec());
    session
        .for_each_dataset(None, move |name, info, remote| {
            for action in actions.iter() {
                action.apply(name, info, remote)?;
            }
            Ok(())
        })
        .await?;
    Ok(())
}

/// Push a metric, bucket every group by it, pop it
async fn bucket_by_stat(
    session: &Session,
    stats: BTreeMap<String, DocStat>,
    range: BucketRange,
) -> ExecutionResult<()> {
    session
        .for_each_dataset(None, move |name, _, remote| {
            let stat = stats
                .get(name)
                .cloned()
                .unwrap_or(DocStat::Constant { value: 0 });
            let depth = remote.push_stat(&stat)?;
            let bucketed = remote.metric_regroup(depth - 1, &range);
            remote.pop_stat()?;
            Ok(bucketed?)
        })
        .await?;
    Ok(())
}

fn checked_groups(session: &Session, per_group: u32) -> ExecutionResult<u64> {
    let total = u64::from(session.num_groups()) * u64::from(per_group);
    session.check_group_limit(total)?;
    Ok(total)
}

pub(super) async fn metric_regroup(
    session: &mut Session,
    metric: &Metric,
    range: &BucketRange,
) -> ExecutionResult<()> {
    range.validate()?;
    checked_groups(session, range.buckets_per_group())?;
    let stats = session
        .dataset_names()
        .into_iter()
        .map(|name| {
            let stat = metric.for_dataset(&name);
            (name, stat)
        })
        .collect();
    bucket_by_stat(session, stats, range.clone()).await?;
    let previous = session.level();
    let level = session.chain_mut().expand(previous, range.keys())?;
    session.push_level(level);
    Ok(())
}

/// Bucket every group into fixed-width time slots over `[start, end)`
///
/// Returns the number of slots. Both bounds must be whole seconds.
async fn time_buckets(
    session: &Session,
    start: i64,
    end: i64,
    width: i64,
    time_field: Option<&str>,
) -> ExecutionResult<u32> {
    let second = 1_000;
    if width <= 0 || width % second != 0 {
        return Err(ExecutionError::invalid_command(format!(
            "time bucket of {}ms is not a positive whole number of seconds",
            width
        )));
    }
    if end <= start {
        return Err(ExecutionError::invalid_command(format!(
            "empty time range [{}, {})",
            start, end
        )));
    }
    let range = BucketRange::new(
        start.div_euclid(second),
        end.div_euclid(second),
        width / second,
        GutterMode::Exclude,
    )?;
    checked_groups(session, range.buckets_per_group())?;
    let stats = session
        .infos()
        .into_iter()
        .map(|(name, info)| {
            let field = time_field.map_or(info.time_field, str::to_string);
            (name, DocStat::field(field))
        })
        .collect();
    bucket_by_stat(session, stats, range.clone()).await?;
    Ok(range.buckets_per_group())
}

/// Round `end` up so that `[start, end)` is a whole number of `width`s
fn align_end(start: i64, end: i64, width: i64) -> i64 {
    let span = end.saturating_sub(start).max(0);
    let rem = span % width;
    if rem == 0 {
        end
    } else {
        end + (width - rem)
    }
}

fn local_time(millis: i64, timezone: FixedOffset) -> ExecutionResult<DateTime<FixedOffset>> {
    at_offset(millis, timezone)
        .ok_or_else(|| ExecutionError::invalid_command(format!("timestamp {} out of range", millis)))
}

pub(super) async fn time_regroup(
    session: &mut Session,
    unit: TimeUnit,
    width: i64,
    time_field: Option<&str>,
) -> ExecutionResult<()> {
    let start = session.earliest_start().div_euclid(1_000) * 1_000;
    let end = align_end(start, session.latest_end(), width.max(1));
    let slots = time_buckets(session, start, end, width, time_field).await?;
    let timezone = session.timezone();
    let mut keys = Vec::with_capacity(slots as usize);
    for i in 0..i64::from(slots) {
        keys.push(GroupKey::TimeRange {
            unit,
            start: local_time(start + i * width, timezone)?,
            end: local_time(start + (i + 1) * width, timezone)?,
        });
    }
    let previous = session.level();
    let level = session.chain_mut().expand(previous, keys)?;
    session.push_level(level);
    Ok(())
}

/// Local midnight at or before `millis`
fn start_of_day(millis: i64, timezone: FixedOffset) -> i64 {
    let offset = i64::from(timezone.local_minus_utc()) * 1_000;
    (millis + offset).div_euclid(day_millis()) * day_millis() - offset
}

/// One bucket per local day, then a remap of each day onto a coarser slot
///
/// `slot_of` maps a day's local start to its child index; `per_group`
/// is the number of slots each parent group is split into.
async fn explode_days<S>(session: &mut Session, per_group: u32, slot_of: S) -> ExecutionResult<()>
where
    S: Fn(DateTime<FixedOffset>) -> u32,
{
    let timezone = session.timezone();
    let start = start_of_day(session.earliest_start(), timezone);
    let end = align_end(start, session.latest_end(), day_millis());
    let old_groups = session.num_groups();
    checked_groups(session, per_group)?;
    let days = time_buckets(session, start, end, day_millis(), None).await?;

    let mut rules = Vec::with_capacity(old_groups as usize * days as usize);
    for group in 1..=old_groups {
        for day in 0..days {
            let day_start = local_time(start + i64::from(day) * day_millis(), timezone)?;
            rules.push(GroupRemapRule {
                target: (group - 1) * days + day + 1,
                new_group: (group - 1) * per_group + slot_of(day_start) + 1,
            });
        }
    }
    let rules = Arc::new(rules);
    session
        .for_each_dataset(None, move |_, _, remote| Ok(remote.remap(&rules)?))
        .await?;
    Ok(())
}

pub(super) async fn explode_day_of_week(session: &mut Session) -> ExecutionResult<()> {
    explode_days(session, 7, |day| day.weekday().num_days_from_monday()).await?;
    let previous = session.level();
    let level = session.chain_mut().day_of_week(previous)?;
    session.push_level(level);
    Ok(())
}

fn month_index(time: &DateTime<FixedOffset>) -> i64 {
    i64::from(time.year()) * 12 + i64::from(time.month0())
}

fn first_of_month(index: i64, timezone: FixedOffset) -> ExecutionResult<DateTime<FixedOffset>> {
    let year = i32::try_from(index.div_euclid(12))
        .map_err(|_| ExecutionError::invalid_command("year out of range"))?;
    let month = (index.rem_euclid(12) + 1) as u32;
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .and_then(|t| timezone.from_local_datetime(&t).single())
        .ok_or_else(|| ExecutionError::invalid_command(format!("no first day for month {}", index)))
}

pub(super) async fn explode_month_of_year(session: &mut Session) -> ExecutionResult<()> {
    let timezone = session.timezone();
    let first = month_index(&local_time(session.earliest_start(), timezone)?);
    let last = month_index(&local_time(session.latest_end() - 1, timezone)?);
    if last < first {
        return Err(ExecutionError::invalid_command("empty time range"));
    }
    let months = u32::try_from(last - first + 1)
        .map_err(|_| ExecutionError::invalid_command("too many months"))?;

    explode_days(session, months, move |day| (month_index(&day) - first) as u32).await?;

    let mut keys = Vec::with_capacity(months as usize);
    for i in 0..i64::from(months) {
        keys.push(GroupKey::StringTerm(
            TimeUnit::Month.format(&first_of_month(first + i, timezone)?),
        ));
    }
    let previous = session.level();
    let level = session.chain_mut().expand(previous, keys)?;
    session.push_level(level);
    Ok(())
}

/// Split every group into one child per term, plus a default child
pub(super) async fn regroup_field_in(
    session: &mut Session,
    field: &str,
    terms: Vec<TermValue>,
    int_terms: bool,
    with_default: bool,
) -> ExecutionResult<()> {
    let num_terms = u32::try_from(terms.len())
        .map_err(|_| ExecutionError::invalid_command("too many terms"))?;
    let per_group = num_terms + u32::from(with_default);
    checked_groups(session, per_group)?;

    let old_groups = session.num_groups();
    let field_name = field.to_string();
    let shared_terms = Arc::new(terms.clone());
    session
        .for_each_dataset(None, move |_, info, remote| {
            let is_int = info.field_is_int(&field_name);
            if !int_terms && is_int == Some(true) {
                return Err(SessionError::FieldTypeMismatch {
                    field: field_name.clone(),
                    expected_int: false,
                }
                .into());
            }
            // int terms against a string field match their decimal form
            let conditions: Vec<RegroupCondition> = shared_terms
                .iter()
                .map(|term| RegroupCondition {
                    field: field_name.clone(),
                    term: match (term, is_int) {
                        (TermValue::Int(v), Some(false)) => TermValue::Str(v.to_string()),
                        _ => term.clone(),
                    },
                })
                .collect();
            let rules: Vec<GroupMultiRemapRule> = (1..=old_groups)
                .map(|group| {
                    let base = (group - 1) * per_group + 1;
                    GroupMultiRemapRule {
                        target: group,
                        negative: if with_default { base + num_terms } else { 0 },
                        positives: (0..num_terms).map(|i| base + i).collect(),
                        conditions: conditions.clone(),
                    }
                })
                .collect();
            Ok(remote.regroup(&rules)?)
        })
        .await?;

    let mut keys: Vec<GroupKey> = terms
        .into_iter()
        .map(|term| match term {
            TermValue::Int(v) => GroupKey::IntTerm(v),
            TermValue::Str(s) => GroupKey::StringTerm(s),
        })
        .collect();
    if with_default {
        keys.push(GroupKey::Default);
    }
    let previous = session.level();
    let level = if keys.is_empty() {
        session.chain_mut().explicit(previous, Vec::new(), Vec::new())?
    } else {
        session.chain_mut().expand(previous, keys)?
    };
    session.push_level(level);
    Ok(())
}

/// Group `g` splits into `2g - 1` (sampled) and `2g` (not sampled)
///
/// Groups are processed from the highest id down so a group is never
/// overwritten before it has been split. Datasets without a sample field
/// send every document to the sampled child.
pub(super) async fn sample_fields(
    session: &mut Session,
    per_dataset_fields: &BTreeMap<String, String>,
    fraction: f64,
    seed: &str,
) -> ExecutionResult<()> {
    if !(0.0..=1.0).contains(&fraction) {
        return Err(ExecutionError::invalid_command(format!(
            "sample fraction {} not in [0, 1]",
            fraction
        )));
    }
    checked_groups(session, 2)?;
    let old_groups = session.num_groups();
    let fields = per_dataset_fields.clone();
    let seed = seed.to_string();
    session
        .for_each_dataset(None, move |name, info, remote| {
            match fields.get(name) {
                Some(field) => {
                    let is_int = info.field_is_int(field).unwrap_or(false);
                    for group in (1..=old_groups).rev() {
                        remote.random_regroup(
                            field,
                            is_int,
                            &seed,
                            fraction,
                            group,
                            2 * group,
                            2 * group - 1,
                        )?;
                    }
                }
                None => {
                    let rules: Vec<GroupRemapRule> = (1..=old_groups)
                        .map(|group| GroupRemapRule {
                            target: group,
                            new_group: 2 * group - 1,
                        })
                        .collect();
                    remote.remap(&rules)?;
                }
            }
            Ok(())
        })
        .await?;
    let keys = vec![
        GroupKey::StringTerm(SAMPLED.to_string()),
        GroupKey::StringTerm(UNSAMPLED.to_string()),
    ];
    let previous = session.level();
    let level = session.chain_mut().expand(previous, keys)?;
    session.push_level(level);
    Ok(())
}

pub(super) async fn regroup_into_parent(session: &mut Session) -> ExecutionResult<()> {
    let keyed = session.chain().unmasked(session.level());
    let previous = session
        .chain()
        .previous(keyed)
        .ok_or_else(|| ExecutionError::invalid_command("already at the root level"))?;
    let mut rules = Vec::with_capacity(session.chain().num_groups(keyed) as usize);
    for group in 1..=session.chain().num_groups(keyed) {
        rules.push(GroupRemapRule {
            target: group,
            new_group: session.chain().parent_group(keyed, group)?,
        });
    }
    let rules = Arc::new(rules);
    session
        .for_each_dataset(None, move |_, _, remote| Ok(remote.remap(&rules)?))
        .await?;
    session.set_level(previous);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groupkeys::offset_from_minutes;
    use chrono::Weekday;

    #[test]
    fn test_align_end() {
        assert_eq!(align_end(0, 10, 5), 10);
        assert_eq!(align_end(0, 11, 5), 15);
        assert_eq!(align_end(3, 3, 5), 3);
    }

    #[test]
    fn test_start_of_day_respects_offset() {
        let utc_minus_6 = offset_from_minutes(-360);
        // 2015-01-01T03:00Z is still 2014-12-31 at UTC-6
        let millis = 1_420_081_200_000;
        let midnight = start_of_day(millis, utc_minus_6);
        let local = at_offset(midnight, utc_minus_6).unwrap();
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2014-12-31 00:00");
        assert_eq!(start_of_day(midnight, utc_minus_6), midnight);
    }

    #[test]
    fn test_month_arithmetic() {
        let utc = offset_from_minutes(0);
        let jan = at_offset(1_420_070_400_000, utc).unwrap();
        let index = month_index(&jan);
        assert_eq!(index, 2015 * 12);
        let feb = first_of_month(index + 1, utc).unwrap();
        assert_eq!(TimeUnit::Month.format(&feb), "February 2015");
        assert_eq!(feb.weekday(), Weekday::Sun);
    }
}
