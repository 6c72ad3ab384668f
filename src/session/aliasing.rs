//! Field aliasing session wrapper
//!
//! Queries may refer to fields by alias. The wrapper rewrites every field
//! name on the way in and reports requested names on the way out of FTGS
//! scans, so the inner session only ever sees real field names.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::ftgs::{BoxedCursor, FtgsCursor};
use crate::groupkeys::BucketRange;

use super::doc::DocStat;
use super::errors::{SessionError, SessionResult};
use super::remote::{
    GroupMultiRemapRule, GroupRemapRule, ImhotepSession, QueryRemapRule, RegroupCondition,
    SessionInfo,
};

/// `new_name` is usable wherever `original_name` is
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldAlias {
    pub original_name: String,
    pub new_name: String,
}

impl FieldAlias {
    pub fn new(original_name: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            new_name: new_name.into(),
        }
    }
}

/// Resolved alias table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    resolved: BTreeMap<String, String>,
}

impl AliasTable {
    /// Resolve alias chains, rejecting cycles
    pub fn new(aliases: &[FieldAlias]) -> SessionResult<Self> {
        let direct: BTreeMap<&str, &str> = aliases
            .iter()
            .map(|a| (a.new_name.as_str(), a.original_name.as_str()))
            .collect();

        let mut resolved = BTreeMap::new();
        for alias in direct.keys() {
            let mut seen = BTreeSet::new();
            let mut current = *alias;
            while let Some(next) = direct.get(current) {
                if !seen.insert(current) {
                    return Err(SessionError::CircularAlias(alias.to_string()));
                }
                current = next;
            }
            resolved.insert(alias.to_string(), current.to_string());
        }
        Ok(Self { resolved })
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Real field name behind `field`
    pub fn resolve(&self, field: &str) -> String {
        self.resolved
            .get(field)
            .cloned()
            .unwrap_or_else(|| field.to_string())
    }
}

/// Session that accepts aliased field names
pub struct AliasingSession {
    inner: Box<dyn ImhotepSession>,
    table: AliasTable,
}

impl AliasingSession {
    pub fn new(inner: Box<dyn ImhotepSession>, aliases: &[FieldAlias]) -> SessionResult<Self> {
        Ok(Self {
            inner,
            table: AliasTable::new(aliases)?,
        })
    }

    fn resolve(&self, field: &str) -> String {
        self.table.resolve(field)
    }

    fn map_stat(&self, stat: &DocStat) -> DocStat {
        stat.map_fields(&|f| self.table.resolve(f))
    }
}

impl ImhotepSession for AliasingSession {
    fn info(&self) -> SessionInfo {
        let mut info = self.inner.info();
        for (alias, original) in &self.table.resolved {
            match info.field_is_int(original) {
                Some(true) => {
                    info.int_fields.insert(alias.clone());
                }
                Some(false) => {
                    info.string_fields.insert(alias.clone());
                }
                None => {}
            }
        }
        info
    }

    fn regroup(&mut self, rules: &[GroupMultiRemapRule]) -> SessionResult<()> {
        let rules: Vec<GroupMultiRemapRule> = rules
            .iter()
            .map(|r| GroupMultiRemapRule {
                conditions: r
                    .conditions
                    .iter()
                    .map(|c| RegroupCondition {
                        field: self.resolve(&c.field),
                        term: c.term.clone(),
                    })
                    .collect(),
                ..r.clone()
            })
            .collect();
        self.inner.regroup(&rules)
    }

    fn remap(&mut self, rules: &[GroupRemapRule]) -> SessionResult<()> {
        self.inner.remap(rules)
    }

    fn query_regroup(&mut self, rule: &QueryRemapRule) -> SessionResult<()> {
        let rule = QueryRemapRule {
            query: rule.query.map_fields(&|f| self.table.resolve(f)),
            ..rule.clone()
        };
        self.inner.query_regroup(&rule)
    }

    fn int_or_regroup(
        &mut self,
        field: &str,
        terms: &[i64],
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()> {
        let field = self.resolve(field);
        self.inner
            .int_or_regroup(&field, terms, target, negative, positive)
    }

    fn string_or_regroup(
        &mut self,
        field: &str,
        terms: &[String],
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()> {
        let field = self.resolve(field);
        self.inner
            .string_or_regroup(&field, terms, target, negative, positive)
    }

    fn regex_regroup(
        &mut self,
        field: &str,
        regex: &str,
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()> {
        let field = self.resolve(field);
        self.inner
            .regex_regroup(&field, regex, target, negative, positive)
    }

    fn random_regroup(
        &mut self,
        field: &str,
        is_int_field: bool,
        seed: &str,
        probability: f64,
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()> {
        let field = self.resolve(field);
        self.inner.random_regroup(
            &field,
            is_int_field,
            seed,
            probability,
            target,
            negative,
            positive,
        )
    }

    fn metric_regroup(&mut self, stat_index: usize, range: &BucketRange) -> SessionResult<()> {
        self.inner.metric_regroup(stat_index, range)
    }

    fn metric_filter(
        &mut self,
        stat_index: usize,
        min: i64,
        max: i64,
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()> {
        self.inner
            .metric_filter(stat_index, min, max, target, negative, positive)
    }

    fn push_stat(&mut self, stat: &DocStat) -> SessionResult<usize> {
        let stat = self.map_stat(stat);
        self.inner.push_stat(&stat)
    }

    fn pop_stat(&mut self) -> SessionResult<()> {
        self.inner.pop_stat()
    }

    fn num_stats(&self) -> usize {
        self.inner.num_stats()
    }

    fn group_stats(&mut self, stat_index: usize) -> SessionResult<Vec<i64>> {
        self.inner.group_stats(stat_index)
    }

    fn ftgs_iterator(
        &mut self,
        int_fields: &[String],
        string_fields: &[String],
    ) -> SessionResult<BoxedCursor> {
        let real_ints: Vec<String> = int_fields.iter().map(|f| self.resolve(f)).collect();
        let real_strings: Vec<String> = string_fields.iter().map(|f| self.resolve(f)).collect();
        let inner = self.inner.ftgs_iterator(&real_ints, &real_strings)?;
        if self.table.is_empty() {
            return Ok(inner);
        }
        let requested = int_fields.iter().chain(string_fields).cloned().collect();
        Ok(Box::new(RenamingCursor {
            inner,
            requested,
            position: None,
        }))
    }

    fn close(&mut self) -> SessionResult<()> {
        self.inner.close()
    }
}

/// Reports fields under the names they were requested by
///
/// Sessions report fields in request order, so the n-th field reported is
/// the n-th name requested.
struct RenamingCursor {
    inner: BoxedCursor,
    requested: Vec<String>,
    position: Option<usize>,
}

impl FtgsCursor for RenamingCursor {
    fn next_field(&mut self) -> bool {
        if !self.inner.next_field() {
            return false;
        }
        self.position = Some(self.position.map_or(0, |p| p + 1));
        true
    }

    fn field_name(&self) -> &str {
        self.position
            .and_then(|p| self.requested.get(p))
            .map_or_else(|| self.inner.field_name(), String::as_str)
    }

    fn field_is_int_type(&self) -> bool {
        self.inner.field_is_int_type()
    }

    fn next_term(&mut self) -> bool {
        self.inner.next_term()
    }

    fn term_int_val(&self) -> i64 {
        self.inner.term_int_val()
    }

    fn term_string_val(&self) -> &str {
        self.inner.term_string_val()
    }

    fn next_group(&mut self) -> bool {
        self.inner.next_group()
    }

    fn group(&self) -> u32 {
        self.inner.group()
    }

    fn num_stats(&self) -> usize {
        self.inner.num_stats()
    }

    fn group_stats(&mut self, buf: &mut [i64]) {
        self.inner.group_stats(buf)
    }

    fn close(&mut self) {
        self.inner.close()
    }
}
