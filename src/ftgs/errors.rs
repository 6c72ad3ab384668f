//! # FTGS Errors

use thiserror::Error;

/// Result type for FTGS operations
pub type FtgsResult<T> = Result<T, FtgsError>;

/// Errors raised while merging or driving FTGS cursors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FtgsError {
    #[error("Field {field} is int in one session and string in another")]
    FieldTypeMismatch { field: String },

    #[error("Sessions disagree on field order: expected {expected}, got {actual}")]
    FieldOrderMismatch { expected: String, actual: String },

    #[error("Sessions report different stat counts: {0} vs {1}")]
    StatCountMismatch(usize, usize),
}
