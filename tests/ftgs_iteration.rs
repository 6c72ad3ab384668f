//! FTGS Iteration Tests
//!
//! Tests for field/term/group/stats iteration:
//! - Records come out field by field, terms ascending, groups ascending
//! - Empty fields, terms and groups produce nothing
//! - Merged cursors sum stats of equal (term, group) pairs

use iqlengine::ftgs::{
    BoxedCursor, FieldScan, FtgsIterator, FtgsRecord, MergingCursor, ScanCursor, TermValue,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn record(field: &str, term: impl Into<TermValue>, group: u32, stats: Vec<i64>) -> FtgsRecord {
    FtgsRecord {
        field: field.to_string(),
        term: term.into(),
        group,
        stats,
    }
}

fn collect(cursor: ScanCursor) -> Vec<FtgsRecord> {
    FtgsIterator::records(cursor).collect()
}

// =============================================================================
// Single Cursor
// =============================================================================

/// Int and string fields yield exactly their populated triples.
#[test]
fn test_int_then_string_field() {
    let cursor = ScanCursor::new(
        vec![
            FieldScan::new("A", true)
                .with_term(1, vec![(1, vec![3])])
                .with_term(2, vec![(2, vec![4])]),
            FieldScan::new("B", false).with_term("x", vec![(1, vec![1])]),
        ],
        1,
    );

    assert_eq!(
        collect(cursor),
        vec![
            record("A", 1, 1, vec![3]),
            record("A", 2, 2, vec![4]),
            record("B", "x", 1, vec![1]),
        ]
    );
}

/// Fields without terms and terms without groups are skipped.
#[test]
fn test_empty_parts_produce_nothing() {
    let cursor = ScanCursor::new(
        vec![
            FieldScan::new("empty", true),
            FieldScan::new("A", true).with_term(5, vec![]),
            FieldScan::new("B", false).with_term("y", vec![(3, vec![2])]),
        ],
        1,
    );

    assert_eq!(collect(cursor), vec![record("B", "y", 3, vec![2])]);
}

/// No fields at all is an empty iteration.
#[test]
fn test_no_fields() {
    assert!(collect(ScanCursor::new(vec![], 2)).is_empty());
}

/// A closed iterator yields nothing more.
#[test]
fn test_close_stops_iteration() {
    let cursor = ScanCursor::new(
        vec![FieldScan::new("A", true)
            .with_term(1, vec![(1, vec![1])])
            .with_term(2, vec![(1, vec![1])])],
        1,
    );
    let mut iter = FtgsIterator::records(cursor);
    assert!(iter.next().is_some());
    iter.close();
    assert!(iter.next().is_none());
}

// =============================================================================
// Merged Cursors
// =============================================================================

/// Stats of the same (term, group) from two sessions are summed.
#[test]
fn test_merge_sums_equal_pairs() {
    let left = ScanCursor::new(
        vec![FieldScan::new("country", false)
            .with_term("gb", vec![(1, vec![2])])
            .with_term("us", vec![(1, vec![1]), (2, vec![5])])],
        1,
    );
    let right = ScanCursor::new(
        vec![FieldScan::new("country", false)
            .with_term("de", vec![(2, vec![7])])
            .with_term("us", vec![(1, vec![10])])],
        1,
    );
    let cursors: Vec<BoxedCursor> = vec![Box::new(left), Box::new(right)];
    let merged = MergingCursor::new(cursors).unwrap();
    let records: Vec<FtgsRecord> = FtgsIterator::records(merged).collect();

    assert_eq!(
        records,
        vec![
            record("country", "de", 2, vec![7]),
            record("country", "gb", 1, vec![2]),
            record("country", "us", 1, vec![11]),
            record("country", "us", 2, vec![5]),
        ]
    );
}

/// Cursors disagreeing on stat width cannot be merged.
#[test]
fn test_merge_rejects_stat_mismatch() {
    let cursors: Vec<BoxedCursor> = vec![
        Box::new(ScanCursor::new(vec![], 1)),
        Box::new(ScanCursor::new(vec![], 2)),
    ];
    assert!(MergingCursor::new(cursors).is_err());
}

/// Cursors disagreeing on field order stop the merge with a failure.
#[test]
fn test_merge_reports_field_mismatch() {
    let cursors: Vec<BoxedCursor> = vec![
        Box::new(ScanCursor::new(
            vec![FieldScan::new("a", true).with_term(1, vec![(1, vec![1])])],
            1,
        )),
        Box::new(ScanCursor::new(
            vec![FieldScan::new("b", true).with_term(1, vec![(1, vec![1])])],
            1,
        )),
    ];
    let merged = MergingCursor::new(cursors).unwrap();
    let mut iter = FtgsIterator::records(merged);
    assert!(iter.next().is_none());
    assert!(iter.cursor().failure().is_some());
}
