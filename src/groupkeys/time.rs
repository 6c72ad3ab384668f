//! Time units and label formatting for time-bucketed group keys

use std::fmt;

use chrono::{DateTime, FixedOffset, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

const SECOND_MILLIS: i64 = 1_000;
const MINUTE_MILLIS: i64 = 60 * SECOND_MILLIS;
const HOUR_MILLIS: i64 = 60 * MINUTE_MILLIS;
const DAY_MILLIS: i64 = 24 * HOUR_MILLIS;

/// Unit of a time GROUP BY
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl TimeUnit {
    /// Nominal bucket width in milliseconds
    ///
    /// Months and years are fixed-width (30 and 365 days) for bucketing;
    /// calendar months are handled by `ExplodeMonthOfYear`.
    pub fn millis(&self) -> i64 {
        match self {
            TimeUnit::Second => SECOND_MILLIS,
            TimeUnit::Minute => MINUTE_MILLIS,
            TimeUnit::Hour => HOUR_MILLIS,
            TimeUnit::Day => DAY_MILLIS,
            TimeUnit::Week => 7 * DAY_MILLIS,
            TimeUnit::Month => 30 * DAY_MILLIS,
            TimeUnit::Year => 365 * DAY_MILLIS,
        }
    }

    /// strftime pattern used for labels
    pub fn pattern(&self) -> &'static str {
        match self {
            TimeUnit::Second => "%Y-%m-%d %H:%M:%S",
            TimeUnit::Minute => "%Y-%m-%d %H:%M",
            TimeUnit::Hour => "%Y-%m-%d %H",
            TimeUnit::Day | TimeUnit::Week => "%Y-%m-%d",
            TimeUnit::Month => "%B %Y",
            TimeUnit::Year => "%Y",
        }
    }

    /// Format a timestamp with this unit's pattern
    pub fn format(&self, time: &DateTime<FixedOffset>) -> String {
        time.format(self.pattern()).to_string()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Second => "SECOND",
            TimeUnit::Minute => "MINUTE",
            TimeUnit::Hour => "HOUR",
            TimeUnit::Day => "DAY",
            TimeUnit::Week => "WEEK",
            TimeUnit::Month => "MONTH",
            TimeUnit::Year => "YEAR",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Milliseconds in one day
pub fn day_millis() -> i64 {
    DAY_MILLIS
}

/// Build a fixed offset from minutes east of UTC
///
/// Out-of-range offsets fall back to UTC.
pub fn offset_from_minutes(minutes: i32) -> FixedOffset {
    FixedOffset::east_opt(minutes.saturating_mul(60)).unwrap_or_else(|| Utc.fix())
}

/// Convert epoch milliseconds into the given offset
///
/// Returns None only for timestamps outside chrono's representable range.
pub fn at_offset(millis: i64, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    offset.timestamp_millis_opt(millis).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_millis() {
        assert_eq!(TimeUnit::Hour.millis(), 3_600_000);
        assert_eq!(TimeUnit::Week.millis(), 7 * 86_400_000);
    }

    #[test]
    fn test_day_format_in_offset() {
        let offset = offset_from_minutes(-360);
        // 2015-01-01T06:00:00Z is midnight at UTC-6
        let t = at_offset(1_420_092_000_000, offset).unwrap();
        assert_eq!(TimeUnit::Second.format(&t), "2015-01-01 00:00:00");
        assert_eq!(TimeUnit::Day.format(&t), "2015-01-01");
        assert_eq!(TimeUnit::Month.format(&t), "January 2015");
        assert_eq!(TimeUnit::Year.format(&t), "2015");
    }

    #[test]
    fn test_bad_offset_falls_back_to_utc() {
        let offset = offset_from_minutes(100_000);
        assert_eq!(offset.local_minus_utc(), 0);
    }
}
