//! In-memory columnar session
//!
//! Holds documents as field → values maps and implements the full remote
//! session contract over them. Used by tests and the CLI harness, and as
//! the reference for what a remote engine must do.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ftgs::{BoxedCursor, FieldScan, GroupScan, ScanCursor, TermScan, TermValue};
use crate::groupkeys::BucketRange;

use super::doc::{DocQuery, DocStat};
use super::errors::{SessionError, SessionResult};
use super::remote::{
    GroupMultiRemapRule, GroupRemapRule, ImhotepSession, QueryRemapRule, SessionInfo,
};

fn default_time_field() -> String {
    "unixtime".to_string()
}

/// One document: multi-valued int and string fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub ints: BTreeMap<String, Vec<i64>>,
    #[serde(default)]
    pub strings: BTreeMap<String, Vec<String>>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an int value
    pub fn int(mut self, field: &str, value: i64) -> Self {
        self.ints.entry(field.to_string()).or_default().push(value);
        self
    }

    /// Add a string value
    pub fn string(mut self, field: &str, value: &str) -> Self {
        self.strings
            .entry(field.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    fn first_int(&self, field: &str) -> Option<i64> {
        self.ints.get(field).and_then(|v| v.first().copied())
    }

    fn has_int(&self, field: &str, term: i64) -> bool {
        self.ints.get(field).map_or(false, |v| v.contains(&term))
    }

    fn has_string(&self, field: &str, term: &str) -> bool {
        self.strings
            .get(field)
            .map_or(false, |v| v.iter().any(|s| s == term))
    }

    fn has_term(&self, field: &str, term: &TermValue) -> bool {
        match term {
            TermValue::Int(v) => self.has_int(field, *v),
            TermValue::Str(v) => self.has_string(field, v),
        }
    }

    fn first_term(&self, field: &str, is_int: bool) -> Option<TermValue> {
        if is_int {
            self.first_int(field).map(TermValue::Int)
        } else {
            self.strings
                .get(field)
                .and_then(|v| v.first())
                .map(|s| TermValue::Str(s.clone()))
        }
    }

    fn terms(&self, field: &str, is_int: bool) -> BTreeSet<TermValue> {
        if is_int {
            self.ints
                .get(field)
                .map(|v| v.iter().map(|t| TermValue::Int(*t)).collect())
                .unwrap_or_default()
        } else {
            self.strings
                .get(field)
                .map(|v| v.iter().map(|t| TermValue::Str(t.clone())).collect())
                .unwrap_or_default()
        }
    }
}

/// All documents of one dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryIndex {
    /// Int field holding the document time in epoch seconds
    #[serde(default = "default_time_field")]
    pub time_field: String,
    #[serde(default)]
    pub docs: Vec<Document>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            time_field: default_time_field(),
            docs: Vec::new(),
        }
    }

    pub fn with_doc(mut self, doc: Document) -> Self {
        self.docs.push(doc);
        self
    }

    pub fn int_fields(&self) -> BTreeSet<String> {
        self.docs
            .iter()
            .flat_map(|d| d.ints.keys().cloned())
            .collect()
    }

    pub fn string_fields(&self) -> BTreeSet<String> {
        self.docs
            .iter()
            .flat_map(|d| d.strings.keys().cloned())
            .collect()
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic sampling decision for one term
fn is_sampled(seed: &str, term: &str, probability: f64) -> bool {
    let digest = Sha256::new()
        .chain_update(seed.as_bytes())
        .chain_update([0u8])
        .chain_update(term.as_bytes())
        .finalize();
    let mut rng_seed = [0u8; 32];
    rng_seed.copy_from_slice(digest.as_slice());
    StdRng::from_seed(rng_seed).gen::<f64>() < probability
}

fn matches(doc: &Document, query: &DocQuery) -> bool {
    match query {
        DocQuery::All => true,
        DocQuery::Term { field, term } => doc.has_term(field, term),
        DocQuery::IntRange { field, min, max } => doc
            .ints
            .get(field)
            .map_or(false, |v| v.iter().any(|x| x >= min && x < max)),
        DocQuery::And { queries } => queries.iter().all(|q| matches(doc, q)),
        DocQuery::Or { queries } => queries.iter().any(|q| matches(doc, q)),
        DocQuery::Not { query } => !matches(doc, query),
    }
}

fn evaluate(doc: &Document, stat: &DocStat) -> i64 {
    match stat {
        DocStat::Count => 1,
        DocStat::Field { field } => doc.first_int(field).unwrap_or(0),
        DocStat::Constant { value } => *value,
        DocStat::HasInt { field, term } => i64::from(doc.has_int(field, *term)),
        DocStat::HasString { field, term } => i64::from(doc.has_string(field, term)),
        DocStat::Add { left, right } => evaluate(doc, left).wrapping_add(evaluate(doc, right)),
        DocStat::Sub { left, right } => evaluate(doc, left).wrapping_sub(evaluate(doc, right)),
        DocStat::Mul { left, right } => evaluate(doc, left).wrapping_mul(evaluate(doc, right)),
    }
}

/// Session over an in-memory index
pub struct InMemorySession {
    info: SessionInfo,
    docs: Vec<Document>,
    groups: Vec<u32>,
    stats: Vec<DocStat>,
    group_capacity: Option<u32>,
    stats_delay: Option<Duration>,
    closed: bool,
}

impl InMemorySession {
    /// Open over the documents whose time lies in `[start_millis, end_millis)`
    ///
    /// Documents without a time value are always included.
    pub fn open(dataset: &str, index: &InMemoryIndex, start_millis: i64, end_millis: i64) -> Self {
        let start = start_millis.div_euclid(1000);
        let end = end_millis.div_euclid(1000);
        let docs: Vec<Document> = index
            .docs
            .iter()
            .filter(|d| match d.first_int(&index.time_field) {
                Some(t) => t >= start && t < end,
                None => true,
            })
            .cloned()
            .collect();

        let mut int_fields = BTreeSet::new();
        let mut string_fields = BTreeSet::new();
        for doc in &docs {
            int_fields.extend(doc.ints.keys().cloned());
            string_fields.extend(doc.strings.keys().cloned());
        }

        let info = SessionInfo {
            dataset: dataset.to_string(),
            num_docs: docs.len() as u64,
            int_fields,
            string_fields,
            start_millis,
            end_millis,
            time_field: index.time_field.clone(),
        };
        let groups = vec![1; docs.len()];
        Self {
            info,
            docs,
            groups,
            stats: Vec::new(),
            group_capacity: None,
            stats_delay: None,
            closed: false,
        }
    }

    /// Fail regroups that would mint a group id above `capacity`
    pub fn with_group_capacity(mut self, capacity: u32) -> Self {
        self.group_capacity = Some(capacity);
        self
    }

    /// Sleep before answering each `group_stats` call, like a slow remote
    pub fn with_stats_delay(mut self, delay: Duration) -> Self {
        self.stats_delay = Some(delay);
        self
    }

    /// Current group of every document, in document order
    pub fn groups(&self) -> &[u32] {
        &self.groups
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_field(&self, field: &str, expect_int: bool) -> SessionResult<()> {
        match self.info.field_is_int(field) {
            Some(is_int) if is_int != expect_int => Err(SessionError::FieldTypeMismatch {
                field: field.to_string(),
                expected_int: expect_int,
            }),
            _ => Ok(()),
        }
    }

    fn stat(&self, index: usize) -> SessionResult<&DocStat> {
        self.stats.get(index).ok_or(SessionError::StatIndexOutOfRange {
            index,
            depth: self.stats.len(),
        })
    }

    fn commit(&mut self, groups: Vec<u32>) -> SessionResult<()> {
        if let Some(capacity) = self.group_capacity {
            if let Some(max) = groups.iter().copied().max().filter(|m| *m > capacity) {
                return Err(SessionError::ResourceExhausted(format!(
                    "{}: group {} exceeds capacity {}",
                    self.info.dataset, max, capacity
                )));
            }
        }
        self.groups = groups;
        Ok(())
    }

    /// Move documents in `target` by predicate
    fn split_target<P>(&mut self, target: u32, negative: u32, positive: u32, pred: P) -> SessionResult<()>
    where
        P: Fn(&Document) -> bool,
    {
        self.ensure_open()?;
        if target == 0 {
            return Ok(());
        }
        let groups = self
            .groups
            .iter()
            .zip(self.docs.iter())
            .map(|(g, doc)| match *g {
                g if g == target => {
                    if pred(doc) {
                        positive
                    } else {
                        negative
                    }
                }
                g => g,
            })
            .collect();
        self.commit(groups)
    }
}

impl ImhotepSession for InMemorySession {
    fn info(&self) -> SessionInfo {
        self.info.clone()
    }

    fn regroup(&mut self, rules: &[GroupMultiRemapRule]) -> SessionResult<()> {
        self.ensure_open()?;
        let by_target: HashMap<u32, &GroupMultiRemapRule> =
            rules.iter().map(|r| (r.target, r)).collect();
        let groups = self
            .groups
            .iter()
            .zip(self.docs.iter())
            .map(|(g, doc)| match by_target.get(g) {
                Some(rule) if *g != 0 => rule
                    .conditions
                    .iter()
                    .position(|c| doc.has_term(&c.field, &c.term))
                    .and_then(|i| rule.positives.get(i).copied())
                    .unwrap_or(rule.negative),
                _ => 0,
            })
            .collect();
        self.commit(groups)
    }

    fn remap(&mut self, rules: &[GroupRemapRule]) -> SessionResult<()> {
        self.ensure_open()?;
        let by_target: HashMap<u32, u32> = rules.iter().map(|r| (r.target, r.new_group)).collect();
        let groups = self
            .groups
            .iter()
            .map(|g| if *g == 0 { 0 } else { by_target.get(g).copied().unwrap_or(0) })
            .collect();
        self.commit(groups)
    }

    fn query_regroup(&mut self, rule: &QueryRemapRule) -> SessionResult<()> {
        let query = rule.query.clone();
        self.split_target(rule.target, rule.negative, rule.positive, |doc| {
            matches(doc, &query)
        })
    }

    fn int_or_regroup(
        &mut self,
        field: &str,
        terms: &[i64],
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()> {
        self.check_field(field, true)?;
        let terms: BTreeSet<i64> = terms.iter().copied().collect();
        self.split_target(target, negative, positive, |doc| {
            doc.ints
                .get(field)
                .map_or(false, |v| v.iter().any(|t| terms.contains(t)))
        })
    }

    fn string_or_regroup(
        &mut self,
        field: &str,
        terms: &[String],
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()> {
        self.check_field(field, false)?;
        let terms: BTreeSet<&str> = terms.iter().map(String::as_str).collect();
        self.split_target(target, negative, positive, |doc| {
            doc.strings
                .get(field)
                .map_or(false, |v| v.iter().any(|t| terms.contains(t.as_str())))
        })
    }

    fn regex_regroup(
        &mut self,
        field: &str,
        regex: &str,
        target: u32,
        negative: u32,
        positive: u32,
    ) -> SessionResult<()> {
        self.check_field(field, false)?;
        let compiled = Regex::new(&format!("^(?:{})$", regex)).map_err(|e| {
            SessionError::InvalidRegex {
                pattern: regex.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.split_target(target, negative, positive, |doc| {
            doc.strings
                .get(field)
                .map_or(false, |v| v.iter().any(|t| compiled.is_match(t)))
        })
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
        if !(0.0..=1.0).contains(&probability) {
            return Err(SessionError::InvalidRequest(format!(
                "sample probability {} not in [0, 1]",
                probability
            )));
        }
        self.check_field(field, is_int_field)?;
        self.split_target(target, negative, positive, |doc| {
            doc.first_term(field, is_int_field)
                .map_or(false, |term| is_sampled(seed, &term.to_string(), probability))
        })
    }

    fn metric_regroup(&mut self, stat_index: usize, range: &BucketRange) -> SessionResult<()> {
        self.ensure_open()?;
        range
            .validate()
            .map_err(|e| SessionError::InvalidRequest(e.message().to_string()))?;
        let stat = self.stat(stat_index)?.clone();
        let per_group = range.buckets_per_group();
        let groups = self
            .groups
            .iter()
            .zip(self.docs.iter())
            .map(|(g, doc)| {
                if *g == 0 {
                    return 0;
                }
                range
                    .child_index(evaluate(doc, &stat))
                    .map_or(0, |child| (*g - 1).saturating_mul(per_group).saturating_add(child + 1))
            })
            .collect();
        self.commit(groups)
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
        let stat = self.stat(stat_index)?.clone();
        self.split_target(target, negative, positive, |doc| {
            let value = evaluate(doc, &stat);
            value >= min && value <= max
        })
    }

    fn push_stat(&mut self, stat: &DocStat) -> SessionResult<usize> {
        self.ensure_open()?;
        self.stats.push(stat.clone());
        Ok(self.stats.len())
    }

    fn pop_stat(&mut self) -> SessionResult<()> {
        self.ensure_open()?;
        self.stats.pop().map(|_| ()).ok_or(SessionError::StatStackEmpty)
    }

    fn num_stats(&self) -> usize {
        self.stats.len()
    }

    fn group_stats(&mut self, stat_index: usize) -> SessionResult<Vec<i64>> {
        self.ensure_open()?;
        if let Some(delay) = self.stats_delay {
            std::thread::sleep(delay);
        }
        let stat = self.stat(stat_index)?;
        let max_group = self.groups.iter().copied().max().unwrap_or(0) as usize;
        let mut sums = vec![0i64; max_group + 1];
        for (g, doc) in self.groups.iter().zip(self.docs.iter()) {
            if *g != 0 {
                let slot = &mut sums[*g as usize];
                *slot = slot.wrapping_add(evaluate(doc, stat));
            }
        }
        Ok(sums)
    }

    fn ftgs_iterator(
        &mut self,
        int_fields: &[String],
        string_fields: &[String],
    ) -> SessionResult<BoxedCursor> {
        self.ensure_open()?;
        for field in int_fields {
            self.check_field(field, true)?;
        }
        for field in string_fields {
            self.check_field(field, false)?;
        }

        let doc_stats: Vec<Vec<i64>> = self
            .docs
            .iter()
            .map(|doc| self.stats.iter().map(|s| evaluate(doc, s)).collect())
            .collect();
        let width = self.stats.len();

        let requested = int_fields
            .iter()
            .map(|f| (f, true))
            .chain(string_fields.iter().map(|f| (f, false)));
        let mut scans = Vec::new();
        for (field, is_int) in requested {
            let mut terms: BTreeMap<TermValue, BTreeMap<u32, Vec<i64>>> = BTreeMap::new();
            for (i, doc) in self.docs.iter().enumerate() {
                let group = self.groups[i];
                if group == 0 {
                    continue;
                }
                for term in doc.terms(field, is_int) {
                    let sums = terms
                        .entry(term)
                        .or_default()
                        .entry(group)
                        .or_insert_with(|| vec![0; width]);
                    for (total, value) in sums.iter_mut().zip(doc_stats[i].iter()) {
                        *total = total.wrapping_add(*value);
                    }
                }
            }
            scans.push(FieldScan {
                name: field.clone(),
                is_int,
                terms: terms
                    .into_iter()
                    .map(|(term, groups)| TermScan {
                        term,
                        groups: groups
                            .into_iter()
                            .map(|(group, stats)| GroupScan { group, stats })
                            .collect(),
                    })
                    .collect(),
            });
        }
        Ok(Box::new(ScanCursor::new(scans, width)))
    }

    fn close(&mut self) -> SessionResult<()> {
        self.closed = true;
        self.stats.clear();
        Ok(())
    }
}
