//! FTGS (Field → Term → Group → Stats) iteration
//!
//! # Flow
//!
//! 1. Each session returns a sorted cursor over the requested fields
//! 2. `MergingCursor` sums several sessions into one sorted cursor
//! 3. `FtgsIterator` walks the cursor and yields one value per
//!    (field, term, group) triple with a non-empty stat vector
//!
//! # Invariants
//!
//! - Output order is field, then term ascending, then group ascending
//! - A field with no terms, or a term with no groups, yields nothing
//! - Iteration is single-pass; the stat buffer is reused between records

mod cursor;
mod errors;
mod iterator;
mod merge;

pub use cursor::{FieldScan, FtgsCursor, GroupScan, ScanCursor, TermScan, TermValue};
pub use errors::{FtgsError, FtgsResult};
pub use iterator::{FtgsIterator, FtgsRecord};
pub use merge::{BoxedCursor, MergingCursor};
