//! Sorted field → term → group scan cursor
//!
//! Remote sessions hand back a cursor positioned before the first field.
//! Callers drive it with the three `next_*` methods; accessors are only
//! meaningful after the matching `next_*` returned true.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A term in either representation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TermValue {
    Int(i64),
    Str(String),
}

impl TermValue {
    pub fn is_int(&self) -> bool {
        matches!(self, TermValue::Int(_))
    }
}

impl PartialOrd for TermValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TermValue {
    /// Ints sort before strings; within a type, natural order
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (TermValue::Int(a), TermValue::Int(b)) => a.cmp(b),
            (TermValue::Str(a), TermValue::Str(b)) => a.cmp(b),
            (TermValue::Int(_), TermValue::Str(_)) => Ordering::Less,
            (TermValue::Str(_), TermValue::Int(_)) => Ordering::Greater,
        }
    }
}

impl fmt::Display for TermValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TermValue::Int(v) => write!(f, "{}", v),
            TermValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for TermValue {
    fn from(v: i64) -> Self {
        TermValue::Int(v)
    }
}

impl From<i32> for TermValue {
    fn from(v: i32) -> Self {
        TermValue::Int(i64::from(v))
    }
}

impl From<String> for TermValue {
    fn from(v: String) -> Self {
        TermValue::Str(v)
    }
}

impl From<&str> for TermValue {
    fn from(v: &str) -> Self {
        TermValue::Str(v.to_string())
    }
}

/// Field → Term → Group → Stats cursor
pub trait FtgsCursor {
    /// Advance to the next field. False when fields are exhausted.
    fn next_field(&mut self) -> bool;

    fn field_name(&self) -> &str;

    /// Int and string fields are mutually exclusive
    fn field_is_int_type(&self) -> bool;

    /// Advance to the next term of the current field
    fn next_term(&mut self) -> bool;

    fn term_int_val(&self) -> i64;

    fn term_string_val(&self) -> &str;

    /// Advance to the next populated group of the current term
    fn next_group(&mut self) -> bool;

    fn group(&self) -> u32;

    /// Width of the stat vector
    fn num_stats(&self) -> usize;

    /// Fill `buf` with the current group's stats
    fn group_stats(&mut self, buf: &mut [i64]);

    /// Release remote resources
    fn close(&mut self) {}
}

impl<C: FtgsCursor + ?Sized> FtgsCursor for Box<C> {
    fn next_field(&mut self) -> bool {
        (**self).next_field()
    }
    fn field_name(&self) -> &str {
        (**self).field_name()
    }
    fn field_is_int_type(&self) -> bool {
        (**self).field_is_int_type()
    }
    fn next_term(&mut self) -> bool {
        (**self).next_term()
    }
    fn term_int_val(&self) -> i64 {
        (**self).term_int_val()
    }
    fn term_string_val(&self) -> &str {
        (**self).term_string_val()
    }
    fn next_group(&mut self) -> bool {
        (**self).next_group()
    }
    fn group(&self) -> u32 {
        (**self).group()
    }
    fn num_stats(&self) -> usize {
        (**self).num_stats()
    }
    fn group_stats(&mut self, buf: &mut [i64]) {
        (**self).group_stats(buf)
    }
    fn close(&mut self) {
        (**self).close()
    }
}

/// Stats for one group under one term
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupScan {
    pub group: u32,
    pub stats: Vec<i64>,
}

/// One term and its populated groups, groups ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermScan {
    pub term: TermValue,
    pub groups: Vec<GroupScan>,
}

/// One field and its terms, terms ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldScan {
    pub name: String,
    pub is_int: bool,
    pub terms: Vec<TermScan>,
}

impl FieldScan {
    pub fn new(name: impl Into<String>, is_int: bool) -> Self {
        Self {
            name: name.into(),
            is_int,
            terms: Vec::new(),
        }
    }

    /// Append a term with its (group, stats) pairs
    pub fn with_term(mut self, term: impl Into<TermValue>, groups: Vec<(u32, Vec<i64>)>) -> Self {
        self.terms.push(TermScan {
            term: term.into(),
            groups: groups
                .into_iter()
                .map(|(group, stats)| GroupScan { group, stats })
                .collect(),
        });
        self
    }
}

/// Cursor over a fully materialized scan
#[derive(Debug, Clone)]
pub struct ScanCursor {
    fields: Vec<FieldScan>,
    num_stats: usize,
    field: Option<usize>,
    term: Option<usize>,
    group: Option<usize>,
}

impl ScanCursor {
    pub fn new(fields: Vec<FieldScan>, num_stats: usize) -> Self {
        Self {
            fields,
            num_stats,
            field: None,
            term: None,
            group: None,
        }
    }

    fn current_field(&self) -> Option<&FieldScan> {
        self.field.and_then(|f| self.fields.get(f))
    }

    fn current_term(&self) -> Option<&TermScan> {
        let term = self.term?;
        self.current_field().and_then(|f| f.terms.get(term))
    }

    fn current_group(&self) -> Option<&GroupScan> {
        let group = self.group?;
        self.current_term().and_then(|t| t.groups.get(group))
    }
}

impl FtgsCursor for ScanCursor {
    fn next_field(&mut self) -> bool {
        let next = self.field.map_or(0, |f| f + 1);
        self.field = Some(next);
        self.term = None;
        self.group = None;
        next < self.fields.len()
    }

    fn field_name(&self) -> &str {
        self.current_field().map_or("", |f| f.name.as_str())
    }

    fn field_is_int_type(&self) -> bool {
        self.current_field().map_or(false, |f| f.is_int)
    }

    fn next_term(&mut self) -> bool {
        let Some(field) = self.current_field() else {
            return false;
        };
        let count = field.terms.len();
        let next = self.term.map_or(0, |t| t + 1);
        self.term = Some(next);
        self.group = None;
        next < count
    }

    fn term_int_val(&self) -> i64 {
        match self.current_term().map(|t| &t.term) {
            Some(TermValue::Int(v)) => *v,
            _ => 0,
        }
    }

    fn term_string_val(&self) -> &str {
        match self.current_term().map(|t| &t.term) {
            Some(TermValue::Str(v)) => v.as_str(),
            _ => "",
        }
    }

    fn next_group(&mut self) -> bool {
        let Some(term) = self.current_term() else {
            return false;
        };
        let count = term.groups.len();
        let next = self.group.map_or(0, |g| g + 1);
        self.group = Some(next);
        next < count
    }

    fn group(&self) -> u32 {
        self.current_group().map_or(0, |g| g.group)
    }

    fn num_stats(&self) -> usize {
        self.num_stats
    }

    fn group_stats(&mut self, buf: &mut [i64]) {
        buf.iter_mut().for_each(|s| *s = 0);
        if let Some(group) = self.current_group() {
            for (slot, value) in buf.iter_mut().zip(group.stats.iter()) {
                *slot = *value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_ordering() {
        assert!(TermValue::Int(2) < TermValue::Int(10));
        assert!(TermValue::from("a") < TermValue::from("b"));
        assert!(TermValue::Int(99) < TermValue::from("0"));
    }

    #[test]
    fn test_scan_cursor_walk() {
        let mut cursor = ScanCursor::new(
            vec![
                FieldScan::new("a", true).with_term(1, vec![(1, vec![3])]),
                FieldScan::new("empty", false),
            ],
            1,
        );
        assert!(cursor.next_field());
        assert_eq!(cursor.field_name(), "a");
        assert!(cursor.field_is_int_type());
        assert!(cursor.next_term());
        assert_eq!(cursor.term_int_val(), 1);
        assert!(cursor.next_group());
        assert_eq!(cursor.group(), 1);
        let mut buf = [0i64; 1];
        cursor.group_stats(&mut buf);
        assert_eq!(buf, [3]);
        assert!(!cursor.next_group());
        assert!(!cursor.next_term());
        assert!(cursor.next_field());
        assert_eq!(cursor.field_name(), "empty");
        assert!(!cursor.next_term());
        assert!(!cursor.next_field());
    }
}
