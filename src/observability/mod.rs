//! Observability for the execution engine
//!
//! - Structured JSON logging
//! - Lifecycle events
//! - Counters
//! - Begin/complete scopes and nested timers
//!
//! # Principles
//!
//! 1. Observability is read-only and never changes query results
//! 2. A failing log write is ignored
//! 3. No background threads
//!
//! # Usage
//!
//! ```ignore
//! use iqlengine::observability::{log_event_with_fields, Event, ObservationScope};
//!
//! log_event_with_fields(Event::CacheMiss, &[("file", "IQL2-abc.tsv")]);
//!
//! let scope = ObservationScope::new("QUERY");
//! // ... run ...
//! scope.complete();
//! ```

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, TreeTimer};

/// Log a lifecycle event at its own severity
pub fn log_event(event: Event) {
    Logger::log(event.severity(), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
