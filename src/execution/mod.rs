//! Command/action execution pipeline
//!
//! # Flow
//!
//! 1. The query executor opens one remote session per dataset and hands
//!    them to a `Session`
//! 2. `run_commands` executes commands left to right; each command fans
//!    out over the datasets on the blocking pool and joins before the
//!    next command starts
//! 3. Regrouping commands add a level to the `GroupKeyChain`; stat
//!    commands read labels back from it
//!
//! # Invariants
//!
//! - Group ids are identical across datasets after every command
//! - Group 0 is never reported
//! - A failed command aborts the pipeline with dataset and command context
//! - Every pushed stat is popped before a command returns

mod action;
mod command;
mod errors;
mod iterate;
mod pipeline;
mod regroup;
mod rows;
mod session;

pub use action::Action;
pub use command::{Command, Metric};
pub use errors::{ExecutionError, ExecutionErrorCode, ExecutionResult, Severity};
pub use pipeline::run_commands;
pub use rows::{CommandOutput, GroupStatsRow, TermRow};
pub use session::{Session, SessionOptions};
