//! Engine lifecycle events
//!
//! Every structured log line names one of these. Names are stable and
//! upper snake case so log consumers can match on them.

use std::fmt;

use super::logger::Severity;

/// Observable events in the execution engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    // Configuration
    ConfigLoaded,

    // Query lifecycle
    QueryBegin,
    QueryComplete,
    QueryFailed,

    // Remote sessions
    SessionsOpened,
    SessionCloseFailed,
    /// A session was busy at close; it is closed once its unit finishes
    SessionCloseDeferred,
    /// A remote session ran out of resources; the query is aborted
    ResourceExhausted,

    // Pipeline
    CommandBegin,
    CommandComplete,
    CommandFailed,
    GroupLimitExceeded,

    // Result cache
    CacheHit,
    CacheMiss,
    CacheDisabled,
    CacheReadFailed,
    CacheWriteFailed,
    CacheWriteComplete,

    // Telemetry
    ProgressHookFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::QueryBegin => "QUERY_BEGIN",
            Event::QueryComplete => "QUERY_COMPLETE",
            Event::QueryFailed => "QUERY_FAILED",
            Event::SessionsOpened => "SESSIONS_OPENED",
            Event::SessionCloseFailed => "SESSION_CLOSE_FAILED",
            Event::SessionCloseDeferred => "SESSION_CLOSE_DEFERRED",
            Event::ResourceExhausted => "RESOURCE_EXHAUSTED",
            Event::CommandBegin => "COMMAND_BEGIN",
            Event::CommandComplete => "COMMAND_COMPLETE",
            Event::CommandFailed => "COMMAND_FAILED",
            Event::GroupLimitExceeded => "GROUP_LIMIT_EXCEEDED",
            Event::CacheHit => "CACHE_HIT",
            Event::CacheMiss => "CACHE_MISS",
            Event::CacheDisabled => "CACHE_DISABLED",
            Event::CacheReadFailed => "CACHE_READ_FAILED",
            Event::CacheWriteFailed => "CACHE_WRITE_FAILED",
            Event::CacheWriteComplete => "CACHE_WRITE_COMPLETE",
            Event::ProgressHookFailed => "PROGRESS_HOOK_FAILED",
        }
    }

    /// Returns true if this event aborts the query it belongs to
    pub fn is_fatal(&self) -> bool {
        matches!(self, Event::ResourceExhausted)
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            _ if self.is_fatal() => Severity::Fatal,
            Event::QueryFailed | Event::CommandFailed | Event::GroupLimitExceeded => {
                Severity::Error
            }
            Event::SessionCloseFailed
            | Event::CacheReadFailed
            | Event::CacheWriteFailed
            | Event::ProgressHookFailed => Severity::Warn,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_upper_snake() {
        let events = [
            Event::ConfigLoaded,
            Event::QueryBegin,
            Event::QueryComplete,
            Event::QueryFailed,
            Event::SessionsOpened,
            Event::SessionCloseFailed,
            Event::SessionCloseDeferred,
            Event::ResourceExhausted,
            Event::CommandBegin,
            Event::CommandComplete,
            Event::CommandFailed,
            Event::GroupLimitExceeded,
            Event::CacheHit,
            Event::CacheMiss,
            Event::CacheDisabled,
            Event::CacheReadFailed,
            Event::CacheWriteFailed,
            Event::CacheWriteComplete,
            Event::ProgressHookFailed,
        ];
        for event in events {
            let s = event.as_str();
            assert!(!s.is_empty());
            assert!(s.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_severity() {
        assert!(Event::ResourceExhausted.is_fatal());
        assert_eq!(Event::ResourceExhausted.severity(), Severity::Fatal);
        assert_eq!(Event::CacheWriteFailed.severity(), Severity::Warn);
        assert_eq!(Event::QueryFailed.severity(), Severity::Error);
        assert_eq!(Event::CacheHit.severity(), Severity::Info);
        assert!(!Event::QueryFailed.is_fatal());
    }

    #[test]
    fn test_display() {
        assert_eq!(Event::CacheMiss.to_string(), "CACHE_MISS");
    }
}
