//! Group key error types
//!
//! Error codes:
//! - IQL_GROUP_OUT_OF_RANGE (ERROR)
//! - IQL_INVALID_GROUP_LEVEL (ERROR)
//! - IQL_GROUP_OVERFLOW (ERROR)
//! - IQL_INVALID_BUCKET_RANGE (ERROR)
//!
//! All of these are compiler-contract violations. A correct command
//! sequence never produces them.

use std::fmt;

/// Group key error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKeyErrorCode {
    /// Group id outside `1..=num_groups`
    OutOfRange,
    /// Level does not exist or is the wrong shape for the operation
    InvalidLevel,
    /// Group id space does not fit in `u32`
    Overflow,
    /// Bucket range is empty or has a non-positive interval
    InvalidBucketRange,
}

impl GroupKeyErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            GroupKeyErrorCode::OutOfRange => "IQL_GROUP_OUT_OF_RANGE",
            GroupKeyErrorCode::InvalidLevel => "IQL_INVALID_GROUP_LEVEL",
            GroupKeyErrorCode::Overflow => "IQL_GROUP_OVERFLOW",
            GroupKeyErrorCode::InvalidBucketRange => "IQL_INVALID_BUCKET_RANGE",
        }
    }
}

impl fmt::Display for GroupKeyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Group key error with context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKeyError {
    code: GroupKeyErrorCode,
    message: String,
    group: Option<u32>,
}

impl GroupKeyError {
    /// Group id is not valid at this level
    pub fn out_of_range(group: u32, num_groups: u32) -> Self {
        Self {
            code: GroupKeyErrorCode::OutOfRange,
            message: format!("group {} not in [1, {}]", group, num_groups),
            group: Some(group),
        }
    }

    /// Level id or level shape is invalid
    pub fn invalid_level(reason: impl Into<String>) -> Self {
        Self {
            code: GroupKeyErrorCode::InvalidLevel,
            message: reason.into(),
            group: None,
        }
    }

    /// Group count overflowed
    pub fn overflow(parent_groups: u32, per_parent: u32) -> Self {
        Self {
            code: GroupKeyErrorCode::Overflow,
            message: format!(
                "{} groups x {} buckets exceeds the group id space",
                parent_groups, per_parent
            ),
            group: None,
        }
    }

    /// Bucket range is malformed
    pub fn invalid_bucket_range(reason: impl Into<String>) -> Self {
        Self {
            code: GroupKeyErrorCode::InvalidBucketRange,
            message: reason.into(),
            group: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> GroupKeyErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the offending group id, if any
    pub fn group(&self) -> Option<u32> {
        self.group
    }
}

impl fmt::Display for GroupKeyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[ERROR] {}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for GroupKeyError {}

/// Result type for group key operations
pub type GroupKeyResult<T> = Result<T, GroupKeyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(GroupKeyErrorCode::OutOfRange.code(), "IQL_GROUP_OUT_OF_RANGE");
        assert_eq!(GroupKeyErrorCode::Overflow.code(), "IQL_GROUP_OVERFLOW");
    }

    #[test]
    fn test_out_of_range_display() {
        let err = GroupKeyError::out_of_range(9, 7);
        assert_eq!(err.group(), Some(9));
        let display = err.to_string();
        assert!(display.contains("IQL_GROUP_OUT_OF_RANGE"));
        assert!(display.contains("[1, 7]"));
    }
}
