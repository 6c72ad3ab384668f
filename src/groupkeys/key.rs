//! Group keys: the label attached to one group id at one GROUP BY level

use std::fmt;

use chrono::{DateTime, FixedOffset};

use super::time::TimeUnit;

const DAY_NAMES: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Label for a single group at a single level
///
/// Closed set of variants; every level kind maps its child index onto
/// one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Root level, carries no label
    Initial,
    /// String term bucket
    StringTerm(String),
    /// Integer term bucket
    IntTerm(i64),
    /// Half-open time bucket `[start, end)`
    TimeRange {
        unit: TimeUnit,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    },
    /// Day of week, 0 = Monday
    DayOfWeek(u8),
    /// Values below the first regular bucket
    LowGutter(i64),
    /// Values at or above the end of the last regular bucket
    HighGutter(i64),
    /// Regular numeric bucket `[start, end)`
    Range { start: i64, end: i64 },
    /// Catch-all for values matching no explicit bucket
    Default,
}

impl GroupKey {
    /// Append this key's label to a row's label list
    ///
    /// Placeholder keys contribute nothing.
    pub fn add_to_labels(&self, labels: &mut Vec<String>) {
        if !self.is_default_placeholder() {
            labels.push(self.to_string());
        }
    }

    /// Whether this key is suppressed from output
    pub fn is_default_placeholder(&self) -> bool {
        matches!(self, GroupKey::Initial)
    }

    /// Day-of-week key for a child index, wrapping at 7
    pub fn day_of_week(index: u32) -> Self {
        GroupKey::DayOfWeek((index % 7) as u8)
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKey::Initial => Ok(()),
            GroupKey::StringTerm(term) => write!(f, "{}", term),
            GroupKey::IntTerm(term) => write!(f, "{}", term),
            GroupKey::TimeRange { unit, start, end } => {
                write!(f, "[{}, {})", unit.format(start), unit.format(end))
            }
            GroupKey::DayOfWeek(day) => {
                write!(f, "{}", DAY_NAMES[usize::from(*day) % DAY_NAMES.len()])
            }
            GroupKey::LowGutter(min) => write!(f, "< {}", min),
            GroupKey::HighGutter(max) => write!(f, ">= {}", max),
            GroupKey::Range { start, end } => write!(f, "[{}, {})", start, end),
            GroupKey::Default => write!(f, "DEFAULT"),
        }
    }
}
