//! Group Key Invariant Tests
//!
//! Tests for the group key chain:
//! - Expansion parent arithmetic is (g-1)/K+1
//! - Group 0 is never present
//! - Gutter buckets never collide with regular buckets
//! - Masked and explicit levels keep their own parent rules

use iqlengine::groupkeys::{
    BucketRange, GroupKey, GroupKeyChain, GroupKeyErrorCode, GutterMode, LevelId,
};

// =============================================================================
// Helper Functions
// =============================================================================

/// Chain with `n` string-term groups under the root
fn chain_with_groups(n: u32) -> (GroupKeyChain, LevelId) {
    let mut chain = GroupKeyChain::new();
    let root = chain.root();
    let keys = (0..n).map(|i| GroupKey::StringTerm(format!("t{}", i))).collect();
    let level = chain.expand(root, keys).unwrap();
    (chain, level)
}

// =============================================================================
// Day Of Week Expansion
// =============================================================================

/// Every child of a 7-way split maps back to its parent and weekday.
#[test]
fn test_day_of_week_parent_and_key() {
    for n in 1..=4 {
        let (mut chain, parent) = chain_with_groups(n);
        let days = chain.day_of_week(parent).unwrap();

        assert_eq!(chain.num_groups(days), 7 * n);
        for g in 1..=7 * n {
            assert_eq!(chain.parent_group(days, g).unwrap(), (g - 1) / 7 + 1);
            assert_eq!(
                chain.group_key(days, g).unwrap(),
                &GroupKey::DayOfWeek(((g - 1) % 7) as u8)
            );
            assert!(chain.is_present(days, g));
        }
        assert!(!chain.is_present(days, 0));
        assert!(!chain.is_present(days, 7 * n + 1));
    }
}

/// Labels accumulate from the root down.
#[test]
fn test_labels_follow_parents() {
    let (mut chain, parent) = chain_with_groups(2);
    let days = chain.day_of_week(parent).unwrap();

    assert_eq!(chain.labels(days, 1).unwrap(), vec!["t0", "Monday"]);
    assert_eq!(chain.labels(days, 14).unwrap(), vec!["t1", "Sunday"]);
}

/// Group 0 and groups past the end are out of range.
#[test]
fn test_out_of_range_groups() {
    let (mut chain, parent) = chain_with_groups(1);
    let days = chain.day_of_week(parent).unwrap();

    let err = chain.parent_group(days, 0).unwrap_err();
    assert_eq!(err.code(), GroupKeyErrorCode::OutOfRange);
    assert!(chain.group_key(days, 8).is_err());
}

// =============================================================================
// Bucket Ranges
// =============================================================================

/// Low and high gutters sit on either side of the regular buckets.
#[test]
fn test_gutter_ordering() {
    let range = BucketRange::new(10, 20, 5, GutterMode::Keep).unwrap();
    let keys = range.keys();

    assert_eq!(range.buckets_per_group(), 4);
    assert_eq!(keys[0], GroupKey::LowGutter(10));
    assert_eq!(keys[1], GroupKey::Range { start: 10, end: 15 });
    assert_eq!(keys[2], GroupKey::Range { start: 15, end: 20 });
    assert_eq!(keys[3], GroupKey::HighGutter(20));

    let low = range.child_index(5).unwrap();
    let high = range.child_index(25).unwrap();
    assert_eq!(keys[low as usize], GroupKey::LowGutter(10));
    assert_eq!(keys[high as usize], GroupKey::HighGutter(20));
    assert_ne!(low, range.child_index(10).unwrap());
    assert_ne!(high, range.child_index(19).unwrap());
}

/// Excluded gutters drop out-of-range values; default gutters share one bucket.
#[test]
fn test_exclude_and_default_gutters() {
    let exclude = BucketRange::new(10, 20, 5, GutterMode::Exclude).unwrap();
    assert_eq!(exclude.child_index(5), None);
    assert_eq!(exclude.child_index(20), None);
    assert_eq!(exclude.child_index(12), Some(0));

    let default = BucketRange::new(10, 20, 5, GutterMode::Default).unwrap();
    assert_eq!(default.child_index(5), Some(2));
    assert_eq!(default.child_index(25), Some(2));
    assert_eq!(default.keys()[2], GroupKey::Default);
}

/// A non-positive interval is rejected.
#[test]
fn test_invalid_range() {
    assert!(BucketRange::new(0, 10, 0, GutterMode::Keep).is_err());
}

// =============================================================================
// Masked And Explicit Levels
// =============================================================================

/// Masking keeps numbering and parents but hides absent groups.
#[test]
fn test_mask_is_identity_on_parents() {
    let (mut chain, parent) = chain_with_groups(3);
    let masked = chain.mask(parent, vec![true, true, false, true]).unwrap();

    assert_eq!(chain.num_groups(masked), 3);
    assert!(!chain.is_present(masked, 0));
    assert!(chain.is_present(masked, 1));
    assert!(!chain.is_present(masked, 2));
    assert_eq!(chain.parent_group(masked, 3).unwrap(), 3);
    assert_eq!(chain.unmasked(masked), parent);
}

/// Mask length must be one slot per group plus group 0.
#[test]
fn test_mask_length_checked() {
    let (mut chain, parent) = chain_with_groups(3);
    assert!(chain.mask(parent, vec![true; 3]).is_err());
}

/// Explicit levels use their own parent table.
#[test]
fn test_explicit_parents() {
    let (mut chain, parent) = chain_with_groups(2);
    let level = chain
        .explicit(
            parent,
            vec![2, 1, 2],
            vec![
                GroupKey::IntTerm(7),
                GroupKey::IntTerm(8),
                GroupKey::Default,
            ],
        )
        .unwrap();

    assert_eq!(chain.num_groups(level), 3);
    assert_eq!(chain.parent_group(level, 1).unwrap(), 2);
    assert_eq!(chain.parent_group(level, 2).unwrap(), 1);
    assert_eq!(chain.labels(level, 3).unwrap(), vec!["t1", "DEFAULT"]);
}

/// Explicit parents must exist in the previous level.
#[test]
fn test_explicit_parent_out_of_range() {
    let (mut chain, parent) = chain_with_groups(2);
    assert!(chain
        .explicit(parent, vec![3], vec![GroupKey::IntTerm(1)])
        .is_err());
}
