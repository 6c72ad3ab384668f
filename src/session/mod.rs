//! Remote index sessions
//!
//! # Layers
//!
//! - `ImhotepSession` is the blocking contract every dataset session meets
//! - `InMemorySession` implements it over in-memory documents
//! - `AliasingSession` wraps any session and rewrites aliased field names
//! - `SessionOpener` hands out sessions per dataset and time range
//!
//! # Invariants
//!
//! - A session's stat stack is shared state: push and pop must pair up
//! - A closed session rejects every further call
//! - Regroups never move documents out of group 0

mod aliasing;
mod doc;
mod errors;
mod memory;
mod opener;
mod remote;

pub use aliasing::{AliasTable, AliasingSession, FieldAlias};
pub use doc::{DocQuery, DocStat};
pub use errors::{SessionError, SessionResult};
pub use memory::{Document, InMemoryIndex, InMemorySession};
pub use opener::{InMemoryOpener, SessionOpener};
pub use remote::{
    GroupMultiRemapRule, GroupRemapRule, ImhotepSession, QueryRemapRule, RegroupCondition,
    SessionInfo,
};
