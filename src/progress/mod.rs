//! Pipeline progress reporting
//!
//! Hooks never influence execution: `notify` logs a failing hook at WARN
//! and the pipeline carries on.

mod callback;
mod errors;

pub use callback::{
    CompositeProgress, EventStreamProgress, LoggingProgress, NoOpProgress, ProgressCallback,
};
pub use errors::{ProgressError, ProgressResult};

use crate::observability::{log_event_with_fields, Event};

/// Log and swallow a hook failure
pub fn notify(hook: &str, result: ProgressResult<()>) {
    if let Err(e) = result {
        let reason = e.to_string();
        log_event_with_fields(
            Event::ProgressHookFailed,
            &[("hook", hook), ("reason", reason.as_str())],
        );
    }
}
