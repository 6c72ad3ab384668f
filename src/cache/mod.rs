//! Query result cache
//!
//! # Flow
//!
//! 1. `CacheKey::compute` digests the compiled query into a file name
//! 2. `lookup` reports `Disabled`, `Miss` or `Hit(bytes)`
//! 3. After a miss the executor renders the result and `store`s it
//!
//! # Invariants
//!
//! - Equal key inputs give equal keys
//! - A file is visible only after its output stream completed
//! - Cache failures never fail a query

mod errors;
mod factory;
mod key;
mod local;
mod memory;
mod noop;
mod store;

pub use errors::{CacheError, CacheResult};
pub use factory::create_cache;
pub use key::{
    is_cache_relevant, CacheKey, CacheKeyInput, DatasetFingerprint, ShardFingerprint,
    VERSION_FOR_HASHING,
};
pub use local::LocalQueryCache;
pub use memory::MemoryQueryCache;
pub use noop::NoOpQueryCache;
pub use store::{lookup, store, CacheLookup, CompletableOutput, CompletableWrite, QueryCache};
