//! Pipeline error types
//!
//! Error codes:
//! - IQL_INVALID_COMMAND (ERROR)
//! - IQL_RESOURCE_EXHAUSTED (FATAL)
//! - IQL_SESSION_FAILED (FATAL)
//! - IQL_GROUP_LIMIT_EXCEEDED (ERROR)
//! - IQL_EXECUTION_TIMEOUT (ERROR)
//! - IQL_INTERNAL (FATAL)
//!
//! Every pipeline failure aborts the query. Severity says whether the
//! remote side is suspect (FATAL) or the query itself was at fault (ERROR).

use std::fmt;

use crate::ftgs::FtgsError;
use crate::groupkeys::GroupKeyError;
use crate::session::SessionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The query was rejected
    Error,
    /// The remote sessions failed underneath the query
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionErrorCode {
    /// Command is not executable against the current sessions
    InvalidCommand,
    /// A remote session ran out of memory or similar
    ResourceExhausted,
    /// A remote session failed for any other reason
    SessionFailed,
    GroupLimitExceeded,
    Timeout,
    /// Engine bug or a panicked worker
    Internal,
}

impl ExecutionErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            ExecutionErrorCode::InvalidCommand => "IQL_INVALID_COMMAND",
            ExecutionErrorCode::ResourceExhausted => "IQL_RESOURCE_EXHAUSTED",
            ExecutionErrorCode::SessionFailed => "IQL_SESSION_FAILED",
            ExecutionErrorCode::GroupLimitExceeded => "IQL_GROUP_LIMIT_EXCEEDED",
            ExecutionErrorCode::Timeout => "IQL_EXECUTION_TIMEOUT",
            ExecutionErrorCode::Internal => "IQL_INTERNAL",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            ExecutionErrorCode::ResourceExhausted
            | ExecutionErrorCode::SessionFailed
            | ExecutionErrorCode::Internal => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for ExecutionErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Pipeline error with dataset and command context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionError {
    code: ExecutionErrorCode,
    message: String,
    dataset: Option<String>,
    command: Option<String>,
}

impl ExecutionError {
    fn new(code: ExecutionErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            dataset: None,
            command: None,
        }
    }

    pub fn invalid_command(reason: impl Into<String>) -> Self {
        Self::new(ExecutionErrorCode::InvalidCommand, reason)
    }

    pub fn resource_exhausted(reason: impl Into<String>) -> Self {
        Self::new(ExecutionErrorCode::ResourceExhausted, reason)
    }

    pub fn session_failed(reason: impl Into<String>) -> Self {
        Self::new(ExecutionErrorCode::SessionFailed, reason)
    }

    pub fn group_limit_exceeded(num_groups: u64, limit: u32) -> Self {
        Self::new(
            ExecutionErrorCode::GroupLimitExceeded,
            format!(
                "Number of groups [{}] exceeds the group limit [{}]",
                num_groups, limit
            ),
        )
    }

    pub fn timeout(millis: u64) -> Self {
        Self::new(
            ExecutionErrorCode::Timeout,
            format!("Query did not finish within {}ms", millis),
        )
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::new(ExecutionErrorCode::Internal, reason)
    }

    /// Attach the dataset the failure happened in, keeping an existing one
    pub fn with_dataset(mut self, dataset: &str) -> Self {
        self.dataset.get_or_insert_with(|| dataset.to_string());
        self
    }

    /// Attach the failing command, keeping an existing one
    pub fn with_command(mut self, command: &str) -> Self {
        self.command.get_or_insert_with(|| command.to_string());
        self
    }

    pub fn code(&self) -> ExecutionErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn dataset(&self) -> Option<&str> {
        self.dataset.as_deref()
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)?;
        if let Some(dataset) = &self.dataset {
            write!(f, " (dataset: {})", dataset)?;
        }
        if let Some(command) = &self.command {
            write!(f, " (command: {})", command)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExecutionError {}

impl From<SessionError> for ExecutionError {
    fn from(e: SessionError) -> Self {
        if e.is_resource_exhaustion() {
            ExecutionError::resource_exhausted(e.to_string())
        } else if e.is_contract_violation() {
            ExecutionError::invalid_command(e.to_string())
        } else {
            ExecutionError::session_failed(e.to_string())
        }
    }
}

impl From<GroupKeyError> for ExecutionError {
    fn from(e: GroupKeyError) -> Self {
        ExecutionError::invalid_command(e.to_string())
    }
}

impl From<FtgsError> for ExecutionError {
    fn from(e: FtgsError) -> Self {
        ExecutionError::invalid_command(e.to_string())
    }
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(ExecutionErrorCode::ResourceExhausted.code(), "IQL_RESOURCE_EXHAUSTED");
        assert_eq!(ExecutionErrorCode::Timeout.code(), "IQL_EXECUTION_TIMEOUT");
    }

    #[test]
    fn test_resource_exhaustion_is_fatal() {
        let err: ExecutionError = SessionError::ResourceExhausted("oom".into()).into();
        assert_eq!(err.code(), ExecutionErrorCode::ResourceExhausted);
        assert!(err.is_fatal());
    }

    #[test]
    fn test_contract_violation_is_invalid_command() {
        let err: ExecutionError = SessionError::UnknownField("f".into()).into();
        assert_eq!(err.code(), ExecutionErrorCode::InvalidCommand);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_context_is_kept_once() {
        let err = ExecutionError::session_failed("closed")
            .with_dataset("jobs")
            .with_dataset("other")
            .with_command("Densify");
        assert_eq!(err.dataset(), Some("jobs"));
        assert_eq!(
            err.to_string(),
            "[FATAL] IQL_SESSION_FAILED: closed (dataset: jobs) (command: Densify)"
        );
    }

    #[test]
    fn test_group_limit_message() {
        let err = ExecutionError::group_limit_exceeded(2_000_000, 1_000_000);
        assert_eq!(
            err.message(),
            "Number of groups [2000000] exceeds the group limit [1000000]"
        );
    }
}
