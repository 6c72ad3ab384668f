//! Result cache store contract
//!
//! Writers go through a `CompletableOutput`: bytes are staged until
//! `complete()` publishes them under the final name. Dropping an output
//! without completing it discards everything written, so a reader never
//! sees a partial file.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use super::errors::{CacheError, CacheResult};

/// Staged write that becomes visible on `complete`
pub trait CompletableWrite: Write + Send {
    fn complete(self: Box<Self>) -> CacheResult<()>;
}

/// Output stream handed out by `QueryCache::get_output_stream`
pub struct CompletableOutput {
    inner: Box<dyn CompletableWrite>,
}

impl CompletableOutput {
    pub fn new(inner: Box<dyn CompletableWrite>) -> Self {
        Self { inner }
    }

    /// Publish the staged bytes
    pub fn complete(self) -> CacheResult<()> {
        self.inner.complete()
    }
}

impl Write for CompletableOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Store for rendered query results, keyed by cache file name
pub trait QueryCache: Send + Sync {
    /// Configured on and currently usable
    fn is_enabled(&self) -> bool;

    /// Configured on, regardless of health
    fn is_enabled_in_config(&self) -> bool;

    fn is_file_cached(&self, name: &str) -> CacheResult<bool>;

    fn get_input_stream(&self, name: &str) -> CacheResult<Box<dyn Read + Send>>;

    fn get_output_stream(&self, name: &str) -> CacheResult<CompletableOutput>;

    /// Copy a local file into the cache under `name`
    fn write_from_file(&self, name: &str, local_path: &Path) -> CacheResult<()> {
        let mut source = File::open(local_path)?;
        let mut output = self.get_output_stream(name)?;
        io::copy(&mut source, &mut output)?;
        output.complete()
    }

    fn healthcheck(&self) -> CacheResult<()>;
}

/// Outcome of looking a result up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Disabled,
    Miss,
    Hit(Vec<u8>),
}

/// Fetch a cached file, distinguishing a disabled cache from a miss
pub fn lookup(cache: &dyn QueryCache, name: &str) -> CacheResult<CacheLookup> {
    if !cache.is_enabled() {
        return Ok(CacheLookup::Disabled);
    }
    if !cache.is_file_cached(name)? {
        return Ok(CacheLookup::Miss);
    }
    let mut bytes = Vec::new();
    cache
        .get_input_stream(name)?
        .read_to_end(&mut bytes)
        .map_err(CacheError::from)?;
    Ok(CacheLookup::Hit(bytes))
}

/// Write `bytes` under `name` through a completable output
pub fn store(cache: &dyn QueryCache, name: &str, bytes: &[u8]) -> CacheResult<()> {
    let mut output = cache.get_output_stream(name)?;
    output.write_all(bytes)?;
    output.complete()
}
