//! # Result Cache Errors

use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Result cache errors
///
/// None of these fail a query: the executor logs them and recomputes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("Cache is unavailable")]
    Unavailable,

    #[error("Cached file not found: {0}")]
    NotFound(String),

    #[error("Invalid cache file name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Io(e.to_string())
    }
}

/// Cache file names are flat: no separators, no parent references
pub(crate) fn check_name(name: &str) -> CacheResult<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
        return Err(CacheError::InvalidName(name.to_string()));
    }
    Ok(())
}
