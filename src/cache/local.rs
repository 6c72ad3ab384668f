//! # Local Directory Cache

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use uuid::Uuid;

use super::errors::{check_name, CacheError, CacheResult};
use super::store::{CompletableOutput, CompletableWrite, QueryCache};

/// Result cache in a local directory
///
/// Outputs are staged in a hidden temp file in the same directory and
/// renamed into place on completion.
#[derive(Debug)]
pub struct LocalQueryCache {
    root: PathBuf,
}

impl LocalQueryCache {
    /// Open a cache rooted at `root`, creating the directory if needed
    pub fn new(root: impl Into<PathBuf>) -> CacheResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full_path(&self, name: &str) -> CacheResult<PathBuf> {
        check_name(name)?;
        Ok(self.root.join(name))
    }
}

impl QueryCache for LocalQueryCache {
    fn is_enabled(&self) -> bool {
        self.root.is_dir()
    }

    fn is_enabled_in_config(&self) -> bool {
        true
    }

    fn is_file_cached(&self, name: &str) -> CacheResult<bool> {
        Ok(self.full_path(name)?.is_file())
    }

    fn get_input_stream(&self, name: &str) -> CacheResult<Box<dyn Read + Send>> {
        let path = self.full_path(name)?;
        let file = File::open(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                CacheError::NotFound(name.to_string())
            } else {
                CacheError::from(e)
            }
        })?;
        Ok(Box::new(file))
    }

    fn get_output_stream(&self, name: &str) -> CacheResult<CompletableOutput> {
        let dest = self.full_path(name)?;
        let temp = self.root.join(format!(".{}.{}.tmp", name, Uuid::new_v4()));
        let file = File::create(&temp)?;
        Ok(CompletableOutput::new(Box::new(LocalOutput {
            writer: Some(BufWriter::new(file)),
            temp,
            dest,
        })))
    }

    fn healthcheck(&self) -> CacheResult<()> {
        let probe = self.root.join(format!(".healthcheck.{}", Uuid::new_v4()));
        fs::write(&probe, b"ok")?;
        fs::remove_file(&probe)?;
        Ok(())
    }
}

struct LocalOutput {
    writer: Option<BufWriter<File>>,
    temp: PathBuf,
    dest: PathBuf,
}

impl LocalOutput {
    fn writer(&mut self) -> io::Result<&mut BufWriter<File>> {
        self.writer
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "output already completed"))
    }
}

impl Write for LocalOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer()?.flush()
    }
}

impl CompletableWrite for LocalOutput {
    fn complete(mut self: Box<Self>) -> CacheResult<()> {
        let writer = self
            .writer
            .take()
            .ok_or_else(|| CacheError::Io("output already completed".to_string()))?;
        let file = writer
            .into_inner()
            .map_err(|e| CacheError::Io(e.error().to_string()))?;
        file.sync_all()?;
        drop(file);
        fs::rename(&self.temp, &self.dest)?;
        Ok(())
    }
}

impl Drop for LocalOutput {
    fn drop(&mut self) {
        // The temp file is gone after a successful rename
        let _ = fs::remove_file(&self.temp);
    }
}
