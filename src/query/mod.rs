//! Query entry point
//!
//! `Query` is the compiled input, `QueryExecutor` runs it and
//! `ResultTable` is what comes back, rendered as TSV.
//!
//! # Invariants
//!
//! - Every opened session is closed before `execute` returns
//! - A cache failure never fails a query
//! - Row limits are applied before the table is cached

mod errors;
mod executor;
mod model;
mod result;

pub use errors::{QueryError, QueryResult};
pub use executor::{QueryExecutor, QueryOutcome};
pub use model::{Query, QueryDataset};
pub use result::{ResultRow, ResultTable};
