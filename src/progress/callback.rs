//! Progress hooks called by the pipeline
//!
//! Order per query: `query_id_assigned`, `start_session`,
//! `sessions_opened`, then `start_command` / `end_command` around every
//! command. `end_command` runs even when the command failed.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::execution::Command;
use crate::observability::Logger;
use crate::session::SessionInfo;

use super::errors::{ProgressError, ProgressResult};

/// Receives pipeline progress
pub trait ProgressCallback: Send + Sync {
    fn query_id_assigned(&self, _query_id: &str) -> ProgressResult<()> {
        Ok(())
    }

    /// `num_commands` is None when the count is not known up front
    fn start_session(&self, num_commands: Option<usize>) -> ProgressResult<()>;

    fn sessions_opened(&self, sessions: &BTreeMap<String, SessionInfo>) -> ProgressResult<()>;

    fn start_command(&self, command: &Command, streaming: bool) -> ProgressResult<()>;

    fn end_command(&self, command: &Command) -> ProgressResult<()>;
}

/// Ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn start_session(&self, _num_commands: Option<usize>) -> ProgressResult<()> {
        Ok(())
    }

    fn sessions_opened(&self, _sessions: &BTreeMap<String, SessionInfo>) -> ProgressResult<()> {
        Ok(())
    }

    fn start_command(&self, _command: &Command, _streaming: bool) -> ProgressResult<()> {
        Ok(())
    }

    fn end_command(&self, _command: &Command) -> ProgressResult<()> {
        Ok(())
    }
}

/// Writes progress as structured TRACE log lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingProgress;

impl ProgressCallback for LoggingProgress {
    fn query_id_assigned(&self, query_id: &str) -> ProgressResult<()> {
        Logger::trace("PROGRESS_QUERY_ID", &[("query_id", query_id)]);
        Ok(())
    }

    fn start_session(&self, num_commands: Option<usize>) -> ProgressResult<()> {
        let steps = num_commands.map_or_else(|| "unknown".to_string(), |n| n.to_string());
        Logger::trace("PROGRESS_SESSION_START", &[("num_commands", steps.as_str())]);
        Ok(())
    }

    fn sessions_opened(&self, sessions: &BTreeMap<String, SessionInfo>) -> ProgressResult<()> {
        for (name, info) in sessions {
            let docs = info.num_docs.to_string();
            Logger::trace(
                "PROGRESS_SESSION_OPENED",
                &[("dataset", name.as_str()), ("num_docs", docs.as_str())],
            );
        }
        Ok(())
    }

    fn start_command(&self, command: &Command, streaming: bool) -> ProgressResult<()> {
        let streaming = streaming.to_string();
        Logger::trace(
            "PROGRESS_COMMAND_START",
            &[("command", command.name()), ("streaming", streaming.as_str())],
        );
        Ok(())
    }

    fn end_command(&self, command: &Command) -> ProgressResult<()> {
        Logger::trace("PROGRESS_COMMAND_END", &[("command", command.name())]);
        Ok(())
    }
}

/// Server-sent events writer
///
/// With `is_stream` off only the chunk counter advances; nothing is
/// written.
pub struct EventStreamProgress<W: Write + Send> {
    out: Mutex<W>,
    is_stream: bool,
    completed_chunks: AtomicU64,
}

impl<W: Write + Send> EventStreamProgress<W> {
    pub fn new(out: W, is_stream: bool) -> Self {
        Self {
            out: Mutex::new(out),
            is_stream,
            completed_chunks: AtomicU64::new(0),
        }
    }

    pub fn completed_chunks(&self) -> u64 {
        self.completed_chunks.load(Ordering::Relaxed)
    }

    /// Recover the writer
    pub fn into_inner(self) -> ProgressResult<W> {
        self.out.into_inner().map_err(|_| ProgressError::Poisoned)
    }

    fn emit(&self, text: &str) -> ProgressResult<()> {
        if !self.is_stream {
            return Ok(());
        }
        let mut out = self.out.lock().map_err(|_| ProgressError::Poisoned)?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }

    fn increment_chunks(&self) -> ProgressResult<()> {
        let n = self.completed_chunks.fetch_add(1, Ordering::Relaxed) + 1;
        self.emit(&format!(
            "event: chunkcomplete\ndata: {{\"eventNumber\":{}}}\n\n",
            n
        ))
    }
}

impl<W: Write + Send> ProgressCallback for EventStreamProgress<W> {
    fn query_id_assigned(&self, query_id: &str) -> ProgressResult<()> {
        self.emit(&format!("event: queryid\ndata: {}\n\n", query_id))
    }

    fn start_session(&self, num_commands: Option<usize>) -> ProgressResult<()> {
        match num_commands {
            Some(n) => self.emit(&format!("event: totalsteps\ndata: {}\n\n", n)),
            None => Ok(()),
        }
    }

    fn sessions_opened(&self, _sessions: &BTreeMap<String, SessionInfo>) -> ProgressResult<()> {
        Ok(())
    }

    fn start_command(&self, command: &Command, streaming: bool) -> ProgressResult<()> {
        self.emit(&format!(": Starting {}\n\n", command.name()))?;
        if streaming {
            self.increment_chunks()?;
            self.emit("event: resultstream\n")?;
        }
        Ok(())
    }

    fn end_command(&self, command: &Command) -> ProgressResult<()> {
        self.emit(&format!(": Completed {}\n\n", command.name()))?;
        self.increment_chunks()
    }
}

/// Fans every call out to several callbacks
///
/// All callbacks are called even when one fails; the first error is
/// returned.
#[derive(Default)]
pub struct CompositeProgress {
    callbacks: Vec<Box<dyn ProgressCallback>>,
}

impl CompositeProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, callback: impl ProgressCallback + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    fn each<F>(&self, call: F) -> ProgressResult<()>
    where
        F: Fn(&dyn ProgressCallback) -> ProgressResult<()>,
    {
        let mut first = None;
        for callback in &self.callbacks {
            if let Err(e) = call(callback.as_ref()) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl ProgressCallback for CompositeProgress {
    fn query_id_assigned(&self, query_id: &str) -> ProgressResult<()> {
        self.each(|c| c.query_id_assigned(query_id))
    }

    fn start_session(&self, num_commands: Option<usize>) -> ProgressResult<()> {
        self.each(|c| c.start_session(num_commands))
    }

    fn sessions_opened(&self, sessions: &BTreeMap<String, SessionInfo>) -> ProgressResult<()> {
        self.each(|c| c.sessions_opened(sessions))
    }

    fn start_command(&self, command: &Command, streaming: bool) -> ProgressResult<()> {
        self.each(|c| c.start_command(command, streaming))
    }

    fn end_command(&self, command: &Command) -> ProgressResult<()> {
        self.each(|c| c.end_command(command))
    }
}
