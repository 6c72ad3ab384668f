//! # Remote Session Errors

use thiserror::Error;

/// Result type for remote session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors raised by remote index sessions
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    // Fatal to the pipeline
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    // Compiler-contract violations
    #[error("Field {field} has the wrong type (expected int: {expected_int})")]
    FieldTypeMismatch { field: String, expected_int: bool },

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Invalid regex {pattern}: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Circular field alias: {0}")]
    CircularAlias(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Stat stack is empty")]
    StatStackEmpty,

    #[error("Stat index {index} out of range ({depth} pushed)")]
    StatIndexOutOfRange { index: usize, depth: usize },

    // Lifecycle
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Session is closed")]
    Closed,

    #[error("Session lock poisoned")]
    Poisoned,
}

impl SessionError {
    /// Whether the failure came from the remote engine running out of resources
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self, SessionError::ResourceExhausted(_))
    }

    /// Whether the failure is a compiler-contract violation
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            SessionError::FieldTypeMismatch { .. }
                | SessionError::UnknownField(_)
                | SessionError::InvalidRegex { .. }
                | SessionError::CircularAlias(_)
                | SessionError::InvalidRequest(_)
                | SessionError::StatStackEmpty
                | SessionError::StatIndexOutOfRange { .. }
        )
    }
}
