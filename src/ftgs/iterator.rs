//! Lazy FTGS iteration
//!
//! `FtgsIterator` drives an `FtgsCursor` and yields one value per
//! (field, term, group) triple. The stat buffer is reused across records:
//! it is filled before the callback runs and overwritten by the next one,
//! so the iterator is single-threaded and cannot be restarted.

use super::cursor::{FtgsCursor, TermValue};

/// Owned record produced by `FtgsIterator::records`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtgsRecord {
    pub field: String,
    pub term: TermValue,
    pub group: u32,
    pub stats: Vec<i64>,
}

/// Iterator over a cursor, mapping each triple through a callback
pub struct FtgsIterator<C: FtgsCursor, F> {
    cursor: C,
    callback: F,
    stats: Vec<i64>,
    field: String,
    field_is_int: bool,
    term: TermValue,
    field_over: bool,
    term_over: bool,
    skip_empty: bool,
    done: bool,
}

impl<C: FtgsCursor> FtgsIterator<C, fn(&str, &TermValue, u32, &[i64]) -> FtgsRecord> {
    /// Iterator producing owned records
    pub fn records(cursor: C) -> Self {
        fn to_record(field: &str, term: &TermValue, group: u32, stats: &[i64]) -> FtgsRecord {
            FtgsRecord {
                field: field.to_string(),
                term: term.clone(),
                group,
                stats: stats.to_vec(),
            }
        }
        FtgsIterator::new(
            cursor,
            to_record as fn(&str, &TermValue, u32, &[i64]) -> FtgsRecord,
        )
    }
}

impl<C, F, T> FtgsIterator<C, F>
where
    C: FtgsCursor,
    F: FnMut(&str, &TermValue, u32, &[i64]) -> T,
{
    /// Wrap a cursor positioned before its first field
    pub fn new(cursor: C, callback: F) -> Self {
        let width = cursor.num_stats();
        Self {
            cursor,
            callback,
            stats: vec![0; width],
            field: String::new(),
            field_is_int: false,
            term: TermValue::Int(0),
            field_over: true,
            term_over: true,
            skip_empty: true,
            done: false,
        }
    }

    /// Also yield groups whose stats are all zero
    pub fn keep_empty(mut self) -> Self {
        self.skip_empty = false;
        self
    }

    /// Release the cursor early; later calls yield nothing
    pub fn close(&mut self) {
        if !self.done {
            self.done = true;
            self.cursor.close();
        }
    }

    /// Access the underlying cursor
    pub fn cursor(&self) -> &C {
        &self.cursor
    }

    fn is_empty_stats(&self) -> bool {
        !self.stats.is_empty() && self.stats.iter().all(|s| *s == 0)
    }
}

impl<C, F, T> Iterator for FtgsIterator<C, F>
where
    C: FtgsCursor,
    F: FnMut(&str, &TermValue, u32, &[i64]) -> T,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.done {
            return None;
        }
        loop {
            if self.field_over {
                if !self.cursor.next_field() {
                    self.close();
                    return None;
                }
                self.field.clear();
                self.field.push_str(self.cursor.field_name());
                self.field_is_int = self.cursor.field_is_int_type();
                self.field_over = false;
                self.term_over = true;
            }
            if self.term_over {
                if !self.cursor.next_term() {
                    self.field_over = true;
                    continue;
                }
                self.term = if self.field_is_int {
                    TermValue::Int(self.cursor.term_int_val())
                } else {
                    TermValue::Str(self.cursor.term_string_val().to_string())
                };
                self.term_over = false;
            }
            if !self.cursor.next_group() {
                self.term_over = true;
                continue;
            }
            let group = self.cursor.group();
            self.cursor.group_stats(&mut self.stats);
            if self.skip_empty && self.is_empty_stats() {
                continue;
            }
            return Some((self.callback)(&self.field, &self.term, group, &self.stats));
        }
    }
}

impl<C: FtgsCursor, F> Drop for FtgsIterator<C, F> {
    fn drop(&mut self) {
        if !self.done {
            self.done = true;
            self.cursor.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftgs::cursor::{FieldScan, ScanCursor};

    fn sample_scan() -> ScanCursor {
        ScanCursor::new(
            vec![
                FieldScan::new("A", true)
                    .with_term(1, vec![(1, vec![3])])
                    .with_term(2, vec![(2, vec![4])]),
                FieldScan::new("B", false).with_term("x", vec![(1, vec![1])]),
            ],
            1,
        )
    }

    #[test]
    fn test_field_term_group_order() {
        let records: Vec<_> = FtgsIterator::records(sample_scan()).collect();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0],
            FtgsRecord {
                field: "A".into(),
                term: TermValue::Int(1),
                group: 1,
                stats: vec![3]
            }
        );
        assert_eq!(records[1].term, TermValue::Int(2));
        assert_eq!(records[1].group, 2);
        assert_eq!(records[2].field, "B");
        assert_eq!(records[2].term, TermValue::Str("x".into()));
    }

    #[test]
    fn test_empty_terms_and_fields_skipped() {
        let cursor = ScanCursor::new(
            vec![
                FieldScan::new("none", true),
                FieldScan::new("A", true)
                    .with_term(1, vec![])
                    .with_term(2, vec![(1, vec![0]), (3, vec![5])]),
            ],
            1,
        );
        let records: Vec<_> = FtgsIterator::records(cursor).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].group, 3);
    }

    #[test]
    fn test_keep_empty_yields_zero_stats() {
        let cursor = ScanCursor::new(
            vec![FieldScan::new("A", true).with_term(2, vec![(1, vec![0])])],
            1,
        );
        let records: Vec<_> = FtgsIterator::records(cursor).keep_empty().collect();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_callback_sees_filled_buffer() {
        let mut seen = Vec::new();
        let iter = FtgsIterator::new(sample_scan(), |field: &str, term: &TermValue, group, stats: &[i64]| {
            format!("{}:{}:{}:{}", field, term, group, stats[0])
        });
        seen.extend(iter);
        assert_eq!(seen, vec!["A:1:1:3", "A:2:2:4", "B:x:1:1"]);
    }

    #[test]
    fn test_close_stops_iteration() {
        let mut iter = FtgsIterator::records(sample_scan());
        assert!(iter.next().is_some());
        iter.close();
        assert!(iter.next().is_none());
    }
}
