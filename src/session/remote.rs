//! Remote index session contract
//!
//! The execution engine only ever talks to datasets through this trait.
//! Calls are blocking; the pipeline runs them on the blocking pool.
//!
//! # Group semantics
//!
//! - Every document carries one group id, 1 after opening
//! - Group 0 documents are filtered out and never move again
//! - Rule-based regroups (`regroup`, `remap`) send documents in groups
//!   without a rule to 0
//! - Targeted regroups (`*_regroup` with `target`) leave documents in
//!   other groups untouched

use std::collections::BTreeSet;

use serde::Serialize;

use crate::ftgs::{BoxedCursor, TermValue};
use crate::groupkeys::BucketRange;

use super::doc::{DocQuery, DocStat};
use super::errors::SessionResult;

/// Term condition of a multi-remap rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegroupCondition {
    pub field: String,
    pub term: TermValue,
}

/// Split one group by term conditions
///
/// A document goes to `positives[i]` for the first matching condition `i`,
/// otherwise to `negative`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMultiRemapRule {
    pub target: u32,
    pub negative: u32,
    pub positives: Vec<u32>,
    pub conditions: Vec<RegroupCondition>,
}

/// Move a whole group to a new id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRemapRule {
    pub target: u32,
    pub new_group: u32,
}

/// Split one group by a document predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRemapRule {
    pub target: u32,
    pub query: DocQuery,
    pub negative: u32,
    pub positive: u32,
}

/// Facts about an opened session, reported to progress hooks
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub dataset: String,
    pub num_docs: u64,
    pub int_fields: BTreeSet<String>,
    pub string_fields: BTreeSet<String>,
    pub start_millis: i64,
    pub end_millis: i64,
    pub time_field: String,
}

impl SessionInfo {
    /// Some(true) for int fields, Some(false) for string fields
    pub fn field_is_int(&self, field: &str) -> Option<bool> {
        if self.int_fields.contains(field) {
            Some(true)
        } else if self.string_fields.contains(field) {
            Some(false)
        } else {
            None
        }
    }
}

/// One dataset's remote session
pub trait ImhotepSession: Send {
    /// Dataset name, field lists and time range
    fn info(&self) -> SessionInfo;

    /// Apply term-conditioned multi-way splits
    fn regroup(&mut self, rules: &[GroupMultiRemapRule]) -> SessionResult<()>;

    /// Move whole groups
    fn remap(&mut self, rules: &[GroupRemapRule]) -> SessionResult<()>;

    fn query_regroup(&mut self, rule: &QueryRemapRule) -> SessionResult<()>;

    fn int_or_regroup(
        &mut self,
        field: &str,
        terms: &[i64],
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()>;

    fn string_or_regroup(
        &mut self,
        field: &str,
        terms: &[String],
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()>;

    /// Full-match regex over a string field's terms
    fn regex_regroup(
        &mut self,
        field: &str,
        regex: &str,
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()>;

    /// Deterministic per-term sampling: same seed and term, same decision
    #[allow(clippy::too_many_arguments)]
    fn random_regroup(
        &mut self,
        field: &str,
        is_int_field: bool,
        seed: &str,
        probability: f64,
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()>;

    /// Bucket every group by the stat at `stat_index`
    ///
    /// Group `g` child `c` (from `range.child_index`) becomes
    /// `(g - 1) * range.buckets_per_group() + c + 1`; dropped values go to 0.
    fn metric_regroup(&mut self, stat_index: usize, range: &BucketRange) -> SessionResult<()>;

    /// Documents in `target` whose stat lies in `[min, max]` go to `positive`
    #[allow(clippy::too_many_arguments)]
    fn metric_filter(
        &mut self,
        stat_index: usize,
        min: i64,
        max: i64,
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()>;

    /// Push a metric; returns the new stack depth
    fn push_stat(&mut self, stat: &DocStat) -> SessionResult<usize>;

    fn pop_stat(&mut self) -> SessionResult<()>;

    fn num_stats(&self) -> usize;

    /// Per-group sums of a pushed stat, indexed by group id
    fn group_stats(&mut self, stat_index: usize) -> SessionResult<Vec<i64>>;

    /// Sorted scan over int fields then string fields, in request order
    ///
    /// Every requested field is reported, even when it has no terms.
    fn ftgs_iterator(
        &mut self,
        int_fields: &[String],
        string_fields: &[String],
    ) -> SessionResult<BoxedCursor>;

    fn close(&mut self) -> SessionResult<()>;
}
