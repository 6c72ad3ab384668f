//! Pipeline Scoping Tests
//!
//! Tests for the command pipeline over several datasets:
//! - Actions leave datasets outside their scope untouched
//! - Regroups keep group ids aligned across datasets
//! - Time and field regroups label rows from the group key chain
//! - Field sampling splits each group into sampled and unsampled children
//! - Remote exhaustion aborts with dataset and command context

use std::sync::Arc;

use iqlengine::execution::{
    run_commands, Command, CommandOutput, ExecutionErrorCode, Session, SessionOptions,
};
use iqlengine::groupkeys::offset_from_minutes;
use iqlengine::observability::MetricsRegistry;
use iqlengine::progress::NoOpProgress;
use iqlengine::session::{Document, ImhotepSession, InMemoryIndex, InMemorySession};

// =============================================================================
// Helper Functions
// =============================================================================

/// Monday 2015-01-05 00:00 UTC
const MONDAY: i64 = 1_420_416_000;
const HOUR: i64 = 3_600;

fn tiers() -> InMemoryIndex {
    InMemoryIndex::new()
        .with_doc(Document::new().int("tier", 1).string("country", "us"))
        .with_doc(Document::new().int("tier", 2).string("country", "gb"))
        .with_doc(Document::new().int("tier", 2).string("country", "us"))
}

fn timed() -> InMemoryIndex {
    InMemoryIndex::new()
        .with_doc(Document::new().int("unixtime", MONDAY + 10 * HOUR).int("clicks", 4))
        .with_doc(Document::new().int("unixtime", MONDAY + 25 * HOUR).int("clicks", 1))
        .with_doc(Document::new().int("unixtime", MONDAY + 29 * HOUR).int("clicks", 2))
}

fn session_over(datasets: &[(&str, InMemoryIndex)], start: i64, end: i64) -> Session {
    session_with(datasets, start, end, None)
}

fn session_with(
    datasets: &[(&str, InMemoryIndex)],
    start: i64,
    end: i64,
    capacity: Option<u32>,
) -> Session {
    let remotes = datasets
        .iter()
        .map(|(name, index)| {
            let mut remote = InMemorySession::open(name, index, start, end);
            if let Some(capacity) = capacity {
                remote = remote.with_group_capacity(capacity);
            }
            (name.to_string(), Box::new(remote) as Box<dyn ImhotepSession>)
        })
        .collect();
    Session::new(
        remotes,
        SessionOptions {
            group_limit: None,
            max_parallelism: 4,
            timezone: offset_from_minutes(0),
        },
        Arc::new(MetricsRegistry::new()),
    )
}

fn commands(json: &str) -> Vec<Command> {
    serde_json::from_str(json).unwrap()
}

/// (labels, stats) of the last command's group stats rows
fn stat_rows(outputs: &[CommandOutput]) -> Vec<(Vec<String>, Vec<i64>)> {
    match outputs.last() {
        Some(CommandOutput::GroupStats(rows)) => rows
            .iter()
            .map(|r| (r.labels.clone(), r.stats.clone()))
            .collect(),
        other => panic!("expected group stats, got {:?}", other),
    }
}

fn labels(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// Scoping
// =============================================================================

/// An action scoped to one dataset leaves the other's groups alone.
#[tokio::test]
async fn test_out_of_scope_dataset_unchanged() {
    let mut session = session_over(&[("a", tiers()), ("b", tiers())], 0, 1000);
    let commands = commands(
        r#"[
            {"command": "apply_filter_actions", "actions": [
                {"action": "int_or", "scope": ["a"], "field": "tier", "terms": [1],
                 "target": 1, "positive": 1, "negative": 0}
            ]},
            {"command": "get_group_stats", "metrics": [
                {"a": {"type": "count"}},
                {"b": {"type": "count"}}
            ]}
        ]"#,
    );

    let outputs = run_commands(&mut session, &commands, &NoOpProgress).await.unwrap();
    assert_eq!(stat_rows(&outputs), vec![(labels(&[]), vec![1, 3])]);
}

/// Actions naming a group past the current level are rejected.
#[tokio::test]
async fn test_action_group_out_of_range() {
    let mut session = session_over(&[("a", tiers())], 0, 1000);
    let commands = commands(
        r#"[{"command": "apply_filter_actions", "actions": [
            {"action": "unconditional", "scope": ["a"], "target": 2, "new_group": 1}
        ]}]"#,
    );

    let err = run_commands(&mut session, &commands, &NoOpProgress)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ExecutionErrorCode::InvalidCommand);
    assert_eq!(err.command(), Some("ApplyFilterActions"));
}

// =============================================================================
// Field Regroups
// =============================================================================

/// Field-in regroups line up across datasets and sum per group.
#[tokio::test]
async fn test_field_in_with_default_across_datasets() {
    let gb_only = InMemoryIndex::new().with_doc(Document::new().string("country", "gb"));
    let mut session = session_over(&[("a", tiers()), ("b", gb_only)], 0, 1000);
    let commands = commands(
        r#"[
            {"command": "string_regroup_field_in", "field": "country", "terms": ["gb"], "with_default": true},
            {"command": "get_group_stats", "metrics": [{"type": "count"}]}
        ]"#,
    );

    let outputs = run_commands(&mut session, &commands, &NoOpProgress).await.unwrap();
    assert_eq!(
        stat_rows(&outputs),
        vec![
            (labels(&["gb"]), vec![2]),
            (labels(&["DEFAULT"]), vec![2]),
        ]
    );
}

/// Regrouping into the parent undoes the last split.
#[tokio::test]
async fn test_regroup_into_parent() {
    let mut session = session_over(&[("a", tiers())], 0, 1000);
    let commands = commands(
        r#"[
            {"command": "int_regroup_field_in", "field": "tier", "terms": [1, 2]},
            {"command": "string_regroup_field_in", "field": "country", "terms": ["gb", "us"]},
            {"command": "regroup_into_parent"},
            {"command": "get_group_stats", "metrics": [{"type": "count"}]}
        ]"#,
    );

    let outputs = run_commands(&mut session, &commands, &NoOpProgress).await.unwrap();
    assert_eq!(
        stat_rows(&outputs),
        vec![(labels(&["1"]), vec![1]), (labels(&["2"]), vec![2])]
    );
}

/// Term iteration merges both datasets and labels each term row.
#[tokio::test]
async fn test_simple_iterate_merges_datasets() {
    let mut session = session_over(&[("a", tiers()), ("b", tiers())], 0, 1000);
    let commands = commands(
        r#"[
            {"command": "int_regroup_field_in", "field": "tier", "terms": [2]},
            {"command": "simple_iterate", "field": "country", "metrics": [{"type": "count"}]}
        ]"#,
    );

    let outputs = run_commands(&mut session, &commands, &NoOpProgress).await.unwrap();
    match outputs.last() {
        Some(CommandOutput::Terms(rows)) => {
            let flat: Vec<(Vec<String>, String, Vec<i64>)> = rows
                .iter()
                .map(|r| (r.labels.clone(), r.term.to_string(), r.stats.clone()))
                .collect();
            assert_eq!(
                flat,
                vec![
                    (labels(&["2"]), "gb".to_string(), vec![2]),
                    (labels(&["2"]), "us".to_string(), vec![2]),
                ]
            );
        }
        other => panic!("expected term rows, got {:?}", other),
    }
}

// =============================================================================
// Sampling
// =============================================================================

fn sample_after_tiers(fraction: f64) -> Vec<Command> {
    commands(&format!(
        r#"[
            {{"command": "int_regroup_field_in", "field": "tier", "terms": [1, 2]}},
            {{"command": "sample_fields", "per_dataset_fields": {{"a": "country"}},
              "fraction": {:?}, "seed": "s"}},
            {{"command": "get_group_stats", "metrics": [{{"type": "count"}}]}}
        ]"#,
        fraction
    ))
}

/// Every parent splits into sampled `2g-1` and unsampled `2g` children.
#[tokio::test]
async fn test_sample_fields_all_sampled() {
    let mut session = session_over(&[("a", tiers())], 0, 1000);
    let outputs = run_commands(&mut session, &sample_after_tiers(1.0), &NoOpProgress)
        .await
        .unwrap();
    assert_eq!(
        stat_rows(&outputs),
        vec![
            (labels(&["1", "sampled"]), vec![1]),
            (labels(&["1", "unsampled"]), vec![0]),
            (labels(&["2", "sampled"]), vec![2]),
            (labels(&["2", "unsampled"]), vec![0]),
        ]
    );
    assert_eq!(session.num_groups(), 4);
}

/// Unsampled documents of a low parent are not split again by a higher one.
#[tokio::test]
async fn test_sample_fields_none_sampled() {
    let mut session = session_over(&[("a", tiers())], 0, 1000);
    let outputs = run_commands(&mut session, &sample_after_tiers(0.0), &NoOpProgress)
        .await
        .unwrap();
    assert_eq!(
        stat_rows(&outputs),
        vec![
            (labels(&["1", "sampled"]), vec![0]),
            (labels(&["1", "unsampled"]), vec![1]),
            (labels(&["2", "sampled"]), vec![0]),
            (labels(&["2", "unsampled"]), vec![2]),
        ]
    );
}

/// The same seed splits the same terms the same way.
#[tokio::test]
async fn test_sample_fields_deterministic() {
    let index = (0..20).fold(InMemoryIndex::new(), |index, i| {
        index.with_doc(Document::new().string("country", &format!("c{}", i)))
    });
    let commands = commands(
        r#"[
            {"command": "sample_fields", "per_dataset_fields": {"a": "country"},
             "fraction": 0.5, "seed": "fixed"},
            {"command": "get_group_stats", "metrics": [{"type": "count"}]}
        ]"#,
    );

    let mut first = session_over(&[("a", index.clone())], 0, 1000);
    let mut second = session_over(&[("a", index)], 0, 1000);
    let a = stat_rows(&run_commands(&mut first, &commands, &NoOpProgress).await.unwrap());
    let b = stat_rows(&run_commands(&mut second, &commands, &NoOpProgress).await.unwrap());

    assert_eq!(a, b);
    assert_eq!(a.iter().map(|(_, s)| s[0]).sum::<i64>(), 20);
}

/// A dataset with no sample field keeps every document in the sampled child.
#[tokio::test]
async fn test_sample_fields_missing_dataset_sampled() {
    let mut session = session_over(&[("a", tiers()), ("b", tiers())], 0, 1000);
    let commands = commands(
        r#"[
            {"command": "sample_fields", "per_dataset_fields": {"a": "country"},
             "fraction": 0.0, "seed": "s"},
            {"command": "get_group_stats", "metrics": [
                {"a": {"type": "count"}},
                {"b": {"type": "count"}}
            ]}
        ]"#,
    );

    let outputs = run_commands(&mut session, &commands, &NoOpProgress).await.unwrap();
    assert_eq!(
        stat_rows(&outputs),
        vec![
            (labels(&["sampled"]), vec![0, 3]),
            (labels(&["unsampled"]), vec![3, 0]),
        ]
    );
}

// =============================================================================
// Time Regroups
// =============================================================================

/// Day buckets are labelled with their half-open range.
#[tokio::test]
async fn test_time_regroup_by_day() {
    let start = MONDAY * 1000;
    let end = start + 2 * 86_400_000;
    let mut session = session_over(&[("jobs", timed())], start, end);
    let commands = commands(
        r#"[
            {"command": "time_regroup", "unit": "DAY"},
            {"command": "get_group_stats", "metrics": [{"type": "count"}, {"type": "field", "field": "clicks"}]}
        ]"#,
    );

    let outputs = run_commands(&mut session, &commands, &NoOpProgress).await.unwrap();
    assert_eq!(
        stat_rows(&outputs),
        vec![
            (labels(&["[2015-01-05, 2015-01-06)"]), vec![1, 4]),
            (labels(&["[2015-01-06, 2015-01-07)"]), vec![2, 3]),
        ]
    );
}

/// Day-of-week explosion followed by densify keeps only populated days.
#[tokio::test]
async fn test_day_of_week_then_densify() {
    let start = MONDAY * 1000;
    let end = start + 2 * 86_400_000;
    let mut session = session_over(&[("jobs", timed())], start, end);
    let commands = commands(
        r#"[
            {"command": "explode_day_of_week"},
            {"command": "densify"},
            {"command": "get_group_stats", "metrics": [{"type": "count"}]}
        ]"#,
    );

    let outputs = run_commands(&mut session, &commands, &NoOpProgress).await.unwrap();
    assert_eq!(
        stat_rows(&outputs),
        vec![
            (labels(&["Monday"]), vec![1]),
            (labels(&["Tuesday"]), vec![2]),
        ]
    );
    assert_eq!(session.num_groups(), 7);
}

// =============================================================================
// Failures
// =============================================================================

/// Remote exhaustion is fatal and names the dataset and command.
#[tokio::test]
async fn test_resource_exhaustion_is_fatal() {
    let mut session = session_with(&[("a", tiers())], 0, 1000, Some(1));
    let commands = commands(
        r#"[{"command": "int_regroup_field_in", "field": "tier", "terms": [1, 2]}]"#,
    );

    let err = run_commands(&mut session, &commands, &NoOpProgress)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ExecutionErrorCode::ResourceExhausted);
    assert!(err.is_fatal());
    assert_eq!(err.dataset(), Some("a"));
    assert_eq!(err.command(), Some("IntRegroupFieldIn"));
}

/// String terms against an int field are a type mismatch.
#[tokio::test]
async fn test_string_terms_on_int_field() {
    let mut session = session_over(&[("a", tiers())], 0, 1000);
    let commands = commands(
        r#"[{"command": "string_regroup_field_in", "field": "tier", "terms": ["1"]}]"#,
    );

    let err = run_commands(&mut session, &commands, &NoOpProgress)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ExecutionErrorCode::InvalidCommand);
}
