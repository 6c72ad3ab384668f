//! iqlengine - IQL group-key execution engine
//!
//! Executes compiled IQL queries as an ordered pipeline of regroup and
//! stat commands over per-dataset remote sessions, with a result cache
//! keyed by a digest of the query.

pub mod cache;
pub mod cli;
pub mod config;
pub mod execution;
pub mod ftgs;
pub mod groupkeys;
pub mod observability;
pub mod progress;
pub mod query;
pub mod session;
