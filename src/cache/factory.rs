//! Cache construction from configuration

use std::sync::Arc;

use crate::config::{CacheBackend, CacheConfig};

use super::errors::{CacheError, CacheResult};
use super::local::LocalQueryCache;
use super::memory::MemoryQueryCache;
use super::noop::NoOpQueryCache;
use super::store::QueryCache;

/// Build the configured cache; a disabled cache is a no-op store
pub fn create_cache(config: &CacheConfig) -> CacheResult<Arc<dyn QueryCache>> {
    if !config.enabled {
        return Ok(Arc::new(NoOpQueryCache));
    }
    match config.backend {
        CacheBackend::Noop => Ok(Arc::new(NoOpQueryCache)),
        CacheBackend::Memory => Ok(Arc::new(MemoryQueryCache::new())),
        CacheBackend::Local => {
            let dir = config
                .local_dir
                .as_ref()
                .ok_or_else(|| CacheError::Io("cache.local_dir is not set".to_string()))?;
            Ok(Arc::new(LocalQueryCache::new(dir.clone())?))
        }
    }
}
