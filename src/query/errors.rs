//! # Query Errors

use thiserror::Error;

use crate::cache::CacheError;
use crate::execution::ExecutionError;
use crate::session::SessionError;

/// Result type for query execution
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors returned by `QueryExecutor::execute`
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    Invalid(String),

    /// Opening or wrapping a dataset session failed
    #[error("Failed to open session for {dataset}: {source}")]
    Open {
        dataset: String,
        #[source]
        source: SessionError,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Only raised while building the executor; cache failures during a
    /// query are logged and recovered
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Malformed result table: {0}")]
    Table(String),
}

impl QueryError {
    /// Whether the remote side, not the query, is to blame
    pub fn is_fatal(&self) -> bool {
        match self {
            QueryError::Execution(e) => e.is_fatal(),
            QueryError::Open { source, .. } => source.is_resource_exhaustion(),
            _ => false,
        }
    }
}
