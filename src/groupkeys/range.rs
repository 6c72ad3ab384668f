//! Numeric bucket ranges with gutter handling
//!
//! A range `[min, max)` split by `interval` has `n = ceil((max - min) / interval)`
//! regular buckets. The effective upper bound is `min + n * interval`.
//!
//! Per-parent layout by gutter mode:
//!
//! - `Keep`:    `[LowGutter] [n regular] [HighGutter]`
//! - `Exclude`: `[n regular]`, out-of-range values are dropped to group 0
//! - `Default`: `[n regular] [Default]`, both gutters merged
//!
//! `child_index` is the only place that maps a value onto this layout.
//! Remote metric regroups and group key levels both go through it.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::errors::{GroupKeyError, GroupKeyResult};
use super::key::GroupKey;

/// How out-of-range values are bucketed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GutterMode {
    /// Separate low and high gutter buckets
    #[default]
    Keep,
    /// No gutters, out-of-range documents leave the result
    Exclude,
    /// One shared default bucket for everything out of range
    Default,
}

/// Explicit numeric bucket range
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BucketRange {
    pub min: i64,
    pub max: i64,
    pub interval: i64,
    #[serde(default)]
    pub gutters: GutterMode,
}

impl BucketRange {
    /// Create a validated bucket range
    pub fn new(min: i64, max: i64, interval: i64, gutters: GutterMode) -> GroupKeyResult<Self> {
        let range = Self {
            min,
            max,
            interval,
            gutters,
        };
        range.validate()?;
        Ok(range)
    }

    /// Check bounds and interval
    pub fn validate(&self) -> GroupKeyResult<()> {
        if self.interval <= 0 {
            return Err(GroupKeyError::invalid_bucket_range(format!(
                "interval must be > 0, got {}",
                self.interval
            )));
        }
        if self.min >= self.max {
            return Err(GroupKeyError::invalid_bucket_range(format!(
                "empty range [{}, {})",
                self.min, self.max
            )));
        }
        let width = self.max.checked_sub(self.min).ok_or_else(|| {
            GroupKeyError::invalid_bucket_range("range width overflows i64")
        })?;
        let buckets = (width - 1) / self.interval + 1;
        if buckets > i64::from(u32::MAX - 2) {
            return Err(GroupKeyError::invalid_bucket_range(format!(
                "{} buckets is too many",
                buckets
            )));
        }
        Ok(())
    }

    /// Number of regular (non-gutter) buckets
    pub fn num_regular(&self) -> u32 {
        let width = self.max.saturating_sub(self.min).max(1);
        ((width - 1) / self.interval.max(1) + 1) as u32
    }

    /// Child buckets minted per parent group
    pub fn buckets_per_group(&self) -> u32 {
        let n = self.num_regular();
        match self.gutters {
            GutterMode::Keep => n + 2,
            GutterMode::Exclude => n,
            GutterMode::Default => n + 1,
        }
    }

    /// End of the last regular bucket
    pub fn effective_max(&self) -> i64 {
        self.min
            .saturating_add(self.interval.saturating_mul(i64::from(self.num_regular())))
    }

    /// Map a value to its 0-based child index, None if it is dropped
    pub fn child_index(&self, value: i64) -> Option<u32> {
        let n = self.num_regular();
        let below = value < self.min;
        let above = value >= self.effective_max();
        match self.gutters {
            GutterMode::Keep if below => Some(0),
            GutterMode::Keep if above => Some(n + 1),
            GutterMode::Exclude if below || above => None,
            GutterMode::Default if below || above => Some(n),
            GutterMode::Keep => Some(self.regular_index(value) + 1),
            _ => Some(self.regular_index(value)),
        }
    }

    fn regular_index(&self, value: i64) -> u32 {
        ((value - self.min) / self.interval) as u32
    }

    /// Keys for one parent's children, in child index order
    pub fn keys(&self) -> Vec<GroupKey> {
        let n = self.num_regular();
        let mut keys = Vec::with_capacity(self.buckets_per_group() as usize);
        if self.gutters == GutterMode::Keep {
            keys.push(GroupKey::LowGutter(self.min));
        }
        for i in 0..i64::from(n) {
            keys.push(GroupKey::Range {
                start: self.min + i * self.interval,
                end: self.min + (i + 1) * self.interval,
            });
        }
        match self.gutters {
            GutterMode::Keep => keys.push(GroupKey::HighGutter(self.effective_max())),
            GutterMode::Default => keys.push(GroupKey::Default),
            GutterMode::Exclude => {}
        }
        keys
    }
}

impl fmt::Display for BucketRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gutters = match self.gutters {
            GutterMode::Keep => "keep",
            GutterMode::Exclude => "exclude",
            GutterMode::Default => "default",
        };
        write!(
            f,
            "BucketRange{{min={}, max={}, interval={}, gutters={}}}",
            self.min, self.max, self.interval, gutters
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gutters_kept() {
        let range = BucketRange::new(10, 20, 5, GutterMode::Keep).unwrap();
        assert_eq!(range.num_regular(), 2);
        assert_eq!(range.buckets_per_group(), 4);
        assert_eq!(range.child_index(5), Some(0));
        assert_eq!(range.child_index(10), Some(1));
        assert_eq!(range.child_index(19), Some(2));
        assert_eq!(range.child_index(25), Some(3));
        assert_eq!(
            range.keys(),
            vec![
                GroupKey::LowGutter(10),
                GroupKey::Range { start: 10, end: 15 },
                GroupKey::Range { start: 15, end: 20 },
                GroupKey::HighGutter(20),
            ]
        );
    }

    #[test]
    fn test_gutters_excluded() {
        let range = BucketRange::new(10, 20, 5, GutterMode::Exclude).unwrap();
        assert_eq!(range.buckets_per_group(), 2);
        assert_eq!(range.child_index(5), None);
        assert_eq!(range.child_index(20), None);
        assert_eq!(range.child_index(12), Some(0));
    }

    #[test]
    fn test_gutters_merged_into_default() {
        let range = BucketRange::new(0, 10, 5, GutterMode::Default).unwrap();
        assert_eq!(range.child_index(-1), Some(2));
        assert_eq!(range.child_index(10), Some(2));
        assert_eq!(range.keys().last(), Some(&GroupKey::Default));
    }

    #[test]
    fn test_uneven_range_rounds_up() {
        let range = BucketRange::new(0, 11, 5, GutterMode::Keep).unwrap();
        assert_eq!(range.num_regular(), 3);
        assert_eq!(range.effective_max(), 15);
        // 12 lands in the last regular bucket, not the high gutter
        assert_eq!(range.child_index(12), Some(3));
        assert_eq!(range.child_index(15), Some(4));
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(BucketRange::new(10, 10, 1, GutterMode::Keep).is_err());
        assert!(BucketRange::new(0, 10, 0, GutterMode::Keep).is_err());
    }
}
