//! Merge per-dataset FTGS cursors into one
//!
//! Every input cursor must report the same fields in the same order.
//! Within a field, terms are merged ascending; within a term, groups are
//! merged ascending and stats of equal (term, group) pairs are summed.

use super::cursor::{FtgsCursor, TermValue};
use super::errors::FtgsError;

/// Boxed cursor handed back by a remote session
pub type BoxedCursor = Box<dyn FtgsCursor + Send>;

/// Cursor summing several sessions' scans
pub struct MergingCursor {
    cursors: Vec<BoxedCursor>,
    field: String,
    field_is_int: bool,
    has_term: Vec<bool>,
    at_term: Vec<usize>,
    term: Option<TermValue>,
    has_group: Vec<bool>,
    at_group: Vec<usize>,
    group: u32,
    num_stats: usize,
    scratch: Vec<i64>,
    failure: Option<FtgsError>,
}

impl MergingCursor {
    /// Merge `cursors`; stat widths must agree
    pub fn new(cursors: Vec<BoxedCursor>) -> Result<Self, FtgsError> {
        let num_stats = cursors.first().map_or(0, |c| c.num_stats());
        if let Some(other) = cursors.iter().find(|c| c.num_stats() != num_stats) {
            return Err(FtgsError::StatCountMismatch(num_stats, other.num_stats()));
        }
        let n = cursors.len();
        Ok(Self {
            cursors,
            field: String::new(),
            field_is_int: false,
            has_term: vec![false; n],
            at_term: Vec::new(),
            term: None,
            has_group: vec![false; n],
            at_group: Vec::new(),
            group: 0,
            num_stats,
            scratch: vec![0; num_stats],
            failure: None,
        })
    }

    /// Set when the inputs disagreed on field order or type
    ///
    /// Iteration stops at the first disagreement.
    pub fn failure(&self) -> Option<&FtgsError> {
        self.failure.as_ref()
    }

    fn term_of(&self, index: usize) -> TermValue {
        let cursor = &self.cursors[index];
        if self.field_is_int {
            TermValue::Int(cursor.term_int_val())
        } else {
            TermValue::Str(cursor.term_string_val().to_string())
        }
    }
}

impl FtgsCursor for MergingCursor {
    fn next_field(&mut self) -> bool {
        if self.failure.is_some() || self.cursors.is_empty() {
            return false;
        }
        let mut advanced = 0;
        for cursor in self.cursors.iter_mut() {
            if cursor.next_field() {
                advanced += 1;
            }
        }
        if advanced == 0 {
            return false;
        }
        if advanced != self.cursors.len() {
            self.failure = Some(FtgsError::FieldOrderMismatch {
                expected: "same field count in every session".to_string(),
                actual: format!("{} of {} sessions advanced", advanced, self.cursors.len()),
            });
            return false;
        }

        self.field.clear();
        self.field.push_str(self.cursors[0].field_name());
        self.field_is_int = self.cursors[0].field_is_int_type();
        for cursor in self.cursors.iter().skip(1) {
            if cursor.field_name() != self.field {
                self.failure = Some(FtgsError::FieldOrderMismatch {
                    expected: self.field.clone(),
                    actual: cursor.field_name().to_string(),
                });
                return false;
            }
            if cursor.field_is_int_type() != self.field_is_int {
                self.failure = Some(FtgsError::FieldTypeMismatch {
                    field: self.field.clone(),
                });
                return false;
            }
        }

        for (i, cursor) in self.cursors.iter_mut().enumerate() {
            self.has_term[i] = cursor.next_term();
        }
        self.at_term.clear();
        self.at_group.clear();
        self.term = None;
        true
    }

    fn field_name(&self) -> &str {
        &self.field
    }

    fn field_is_int_type(&self) -> bool {
        self.field_is_int
    }

    fn next_term(&mut self) -> bool {
        for &i in &self.at_term {
            self.has_term[i] = self.cursors[i].next_term();
        }
        self.at_term.clear();
        self.at_group.clear();

        let mut smallest: Option<TermValue> = None;
        for i in 0..self.cursors.len() {
            if !self.has_term[i] {
                continue;
            }
            let term = self.term_of(i);
            let is_new_min = smallest.as_ref().map_or(true, |current| term < *current);
            if is_new_min {
                self.at_term.clear();
                self.at_term.push(i);
                smallest = Some(term);
            } else if smallest.as_ref() == Some(&term) {
                self.at_term.push(i);
            }
        }
        self.term = smallest;
        if self.term.is_none() {
            return false;
        }

        for &i in &self.at_term {
            self.has_group[i] = self.cursors[i].next_group();
        }
        true
    }

    fn term_int_val(&self) -> i64 {
        match &self.term {
            Some(TermValue::Int(v)) => *v,
            _ => 0,
        }
    }

    fn term_string_val(&self) -> &str {
        match &self.term {
            Some(TermValue::Str(v)) => v.as_str(),
            _ => "",
        }
    }

    fn next_group(&mut self) -> bool {
        for &i in &self.at_group {
            self.has_group[i] = self.cursors[i].next_group();
        }
        self.at_group.clear();

        let mut smallest: Option<u32> = None;
        for &i in &self.at_term {
            if !self.has_group[i] {
                continue;
            }
            let group = self.cursors[i].group();
            if smallest.map_or(true, |current| group < current) {
                self.at_group.clear();
                self.at_group.push(i);
                smallest = Some(group);
            } else if smallest == Some(group) {
                self.at_group.push(i);
            }
        }
        match smallest {
            Some(group) => {
                self.group = group;
                true
            }
            None => false,
        }
    }

    fn group(&self) -> u32 {
        self.group
    }

    fn num_stats(&self) -> usize {
        self.num_stats
    }

    fn group_stats(&mut self, buf: &mut [i64]) {
        buf.iter_mut().for_each(|s| *s = 0);
        self.scratch.resize(buf.len(), 0);
        for &i in &self.at_group {
            self.cursors[i].group_stats(&mut self.scratch);
            for (total, value) in buf.iter_mut().zip(self.scratch.iter()) {
                *total += *value;
            }
        }
    }

    fn close(&mut self) {
        for cursor in self.cursors.iter_mut() {
            cursor.close();
        }
    }
}
