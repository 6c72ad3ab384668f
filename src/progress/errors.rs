//! # Progress Hook Errors

use thiserror::Error;

pub type ProgressResult<T> = Result<T, ProgressError>;

/// Progress hook failures; logged and otherwise ignored
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("Error encountered writing to text/event-stream output: {0}")]
    Stream(String),

    #[error("Progress hook lock poisoned")]
    Poisoned,
}

impl From<std::io::Error> for ProgressError {
    fn from(e: std::io::Error) -> Self {
        ProgressError::Stream(e.to_string())
    }
}
