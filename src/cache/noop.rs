//! Cache that stores nothing

use std::io::Read;

use super::errors::{CacheError, CacheResult};
use super::store::{CompletableOutput, QueryCache};

/// Always disabled, never cached; reads and writes are `Unavailable`
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpQueryCache;

impl QueryCache for NoOpQueryCache {
    fn is_enabled(&self) -> bool {
        false
    }

    fn is_enabled_in_config(&self) -> bool {
        false
    }

    fn is_file_cached(&self, _name: &str) -> CacheResult<bool> {
        Ok(false)
    }

    fn get_input_stream(&self, _name: &str) -> CacheResult<Box<dyn Read + Send>> {
        Err(CacheError::Unavailable)
    }

    fn get_output_stream(&self, _name: &str) -> CacheResult<CompletableOutput> {
        Err(CacheError::Unavailable)
    }

    fn write_from_file(&self, _name: &str, _local_path: &std::path::Path) -> CacheResult<()> {
        Err(CacheError::Unavailable)
    }

    fn healthcheck(&self) -> CacheResult<()> {
        Ok(())
    }
}
