//! Group key subsystem
//!
//! Hierarchical group numbering for nested GROUP BY levels.
//!
//! # Model
//!
//! - Group id 0 is reserved for "absent / filtered out"
//! - Valid ids at a level are `1..=num_groups`
//! - Ids are session-global: the same id means the same partition in
//!   every dataset, so per-dataset stats sum per group
//!
//! # Expansion arithmetic
//!
//! Splitting each parent into `K` children allocates
//! `parent(g) = (g - 1) / K + 1` and `child(g) = (g - 1) % K`.
//! Day of week, time buckets, metric buckets and term buckets all use it.

mod chain;
mod errors;
mod key;
mod range;
mod time;

pub use chain::{GroupKeyChain, LevelId, LevelKind};
pub use errors::{GroupKeyError, GroupKeyErrorCode, GroupKeyResult};
pub use key::GroupKey;
pub use range::{BucketRange, GutterMode};
pub use time::{at_offset, day_millis, offset_from_minutes, TimeUnit};
