//! Process-local result cache

use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::errors::{check_name, CacheError, CacheResult};
use super::store::{CompletableOutput, CompletableWrite, QueryCache};

type Files = Arc<Mutex<BTreeMap<String, Arc<Vec<u8>>>>>;

/// Cache holding files in memory; contents are lost with the process
#[derive(Debug, Default)]
pub struct MemoryQueryCache {
    files: Files,
    reads: AtomicU64,
    writes: Arc<AtomicU64>,
}

impl MemoryQueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Completed input streams handed out
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Completed writes
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    fn poisoned() -> CacheError {
        CacheError::Io("cache lock poisoned".to_string())
    }
}

impl QueryCache for MemoryQueryCache {
    fn is_enabled(&self) -> bool {
        true
    }

    fn is_enabled_in_config(&self) -> bool {
        true
    }

    fn is_file_cached(&self, name: &str) -> CacheResult<bool> {
        check_name(name)?;
        let files = self.files.lock().map_err(|_| Self::poisoned())?;
        Ok(files.contains_key(name))
    }

    fn get_input_stream(&self, name: &str) -> CacheResult<Box<dyn Read + Send>> {
        check_name(name)?;
        let files = self.files.lock().map_err(|_| Self::poisoned())?;
        let bytes = files
            .get(name)
            .cloned()
            .ok_or_else(|| CacheError::NotFound(name.to_string()))?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(Cursor::new(bytes.as_ref().clone())))
    }

    fn get_output_stream(&self, name: &str) -> CacheResult<CompletableOutput> {
        check_name(name)?;
        Ok(CompletableOutput::new(Box::new(MemoryOutput {
            name: name.to_string(),
            buffer: Vec::new(),
            files: Arc::clone(&self.files),
            writes: Arc::clone(&self.writes),
        })))
    }

    fn healthcheck(&self) -> CacheResult<()> {
        self.files.lock().map(|_| ()).map_err(|_| Self::poisoned())
    }
}

struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: Files,
    writes: Arc<AtomicU64>,
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CompletableWrite for MemoryOutput {
    fn complete(self: Box<Self>) -> CacheResult<()> {
        let MemoryOutput {
            name,
            buffer,
            files,
            writes,
        } = *self;
        files
            .lock()
            .map_err(|_| MemoryQueryCache::poisoned())?
            .insert(name, Arc::new(buffer));
        writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
