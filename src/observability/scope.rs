//! Start/finish logging scopes and nested timers
//!
//! - `ObservationScope` logs `{NAME}_BEGIN` on creation
//! - `complete()` logs `{NAME}_COMPLETE`, `fail()` logs `{NAME}_FAILED`
//! - Dropping an unfinished scope logs `{NAME}_INCOMPLETE`
//!
//! Every finishing line carries the scope's fields and `duration_ms`.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use super::logger::{Logger, Severity};

/// Scope that logs its own begin and end
pub struct ObservationScope {
    name: String,
    fields: Vec<(String, String)>,
    started: Instant,
    finished: bool,
}

impl ObservationScope {
    pub fn new(name: &str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Scope whose fields are repeated on every line it logs
    pub fn with_fields(name: &str, fields: &[(&str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);
        Self {
            name: name.to_string(),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            started: Instant::now(),
            finished: false,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(mut self, extra: &[(&str, &str)]) {
        self.finish(Severity::Info, "COMPLETE", extra);
    }

    /// Logs `{NAME}_FAILED` at ERROR
    pub fn fail(mut self, reason: &str) {
        self.finish(Severity::Error, "FAILED", &[("reason", reason)]);
    }

    /// Logs `{NAME}_FAILED` at FATAL
    pub fn fail_fatal(mut self, reason: &str) {
        self.finish(Severity::Fatal, "FAILED", &[("reason", reason)]);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn finish(&mut self, severity: Severity, suffix: &str, extra: &[(&str, &str)]) {
        self.finished = true;
        let duration = self.started.elapsed().as_millis().to_string();
        let mut fields: Vec<(&str, &str)> = self
            .fields
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        fields.extend(extra.iter().copied());
        fields.push(("duration_ms", duration.as_str()));
        Logger::log(severity, &format!("{}_{}", self.name, suffix), &fields);
    }
}

impl Drop for ObservationScope {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(
                Severity::Warn,
                "INCOMPLETE",
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

struct TimerEntry {
    name: String,
    depth: usize,
    elapsed: Option<Duration>,
}

/// Nested wall-clock timer
///
/// `push` opens a named span under the innermost open span, `pop` closes
/// it. `summary` renders every span in open order, indented by depth.
#[derive(Default)]
pub struct TreeTimer {
    entries: Vec<TimerEntry>,
    open: Vec<(usize, Instant)>,
}

impl TreeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>) {
        self.entries.push(TimerEntry {
            name: name.into(),
            depth: self.open.len(),
            elapsed: None,
        });
        self.open.push((self.entries.len() - 1, Instant::now()));
    }

    /// Close the innermost span; no-op when nothing is open
    pub fn pop(&mut self) {
        if let Some((index, started)) = self.open.pop() {
            if let Some(entry) = self.entries.get_mut(index) {
                entry.elapsed = Some(started.elapsed());
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    pub fn summary(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            let _ = write!(out, "{:indent$}{}", "", entry.name, indent = entry.depth * 2);
            match entry.elapsed {
                Some(d) => {
                    let _ = writeln!(out, ": {}ms", d.as_millis());
                }
                None => {
                    let _ = writeln!(out, ": open");
                }
            }
        }
        out
    }
}
