//! Per-document predicates and metrics understood by remote sessions
//!
//! Both render to a stable text form; commands embed that form in their
//! own `Display`, which feeds the cache key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ftgs::TermValue;

/// Boolean per-document predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocQuery {
    /// Matches every document
    All,
    /// Field has the term among its values
    Term { field: String, term: TermValue },
    /// Some int value of field lies in `[min, max)`
    IntRange { field: String, min: i64, max: i64 },
    And { queries: Vec<DocQuery> },
    Or { queries: Vec<DocQuery> },
    Not { query: Box<DocQuery> },
}

impl DocQuery {
    pub fn term(field: impl Into<String>, term: impl Into<TermValue>) -> Self {
        DocQuery::Term {
            field: field.into(),
            term: term.into(),
        }
    }

    /// Rewrite every field name through `rename`
    pub fn map_fields(&self, rename: &dyn Fn(&str) -> String) -> DocQuery {
        match self {
            DocQuery::All => DocQuery::All,
            DocQuery::Term { field, term } => DocQuery::Term {
                field: rename(field),
                term: term.clone(),
            },
            DocQuery::IntRange { field, min, max } => DocQuery::IntRange {
                field: rename(field),
                min: *min,
                max: *max,
            },
            DocQuery::And { queries } => DocQuery::And {
                queries: queries.iter().map(|q| q.map_fields(rename)).collect(),
            },
            DocQuery::Or { queries } => DocQuery::Or {
                queries: queries.iter().map(|q| q.map_fields(rename)).collect(),
            },
            DocQuery::Not { query } => DocQuery::Not {
                query: Box::new(query.map_fields(rename)),
            },
        }
    }
}

impl fmt::Display for DocQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocQuery::All => write!(f, "*"),
            DocQuery::Term { field, term } => match term {
                TermValue::Int(v) => write!(f, "{}:{}", field, v),
                TermValue::Str(v) => write!(f, "{}:\"{}\"", field, v),
            },
            DocQuery::IntRange { field, min, max } => write!(f, "{}:[{}, {})", field, min, max),
            DocQuery::And { queries } => write_joined(f, queries, " AND "),
            DocQuery::Or { queries } => write_joined(f, queries, " OR "),
            DocQuery::Not { query } => write!(f, "-({})", query),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, queries: &[DocQuery], sep: &str) -> fmt::Result {
    write!(f, "(")?;
    for (i, q) in queries.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", q)?;
    }
    write!(f, ")")
}

/// Integer per-document metric pushed onto a session's stat stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DocStat {
    /// 1 for every document
    Count,
    /// First value of an int field, 0 when absent
    Field { field: String },
    Constant { value: i64 },
    /// 1 if the int field has the term
    HasInt { field: String, term: i64 },
    /// 1 if the string field has the term
    HasString { field: String, term: String },
    Add { left: Box<DocStat>, right: Box<DocStat> },
    Sub { left: Box<DocStat>, right: Box<DocStat> },
    Mul { left: Box<DocStat>, right: Box<DocStat> },
}

impl DocStat {
    pub fn field(name: impl Into<String>) -> Self {
        DocStat::Field { field: name.into() }
    }

    /// Rewrite every field name through `rename`
    pub fn map_fields(&self, rename: &dyn Fn(&str) -> String) -> DocStat {
        let pair = |l: &DocStat, r: &DocStat| {
            (Box::new(l.map_fields(rename)), Box::new(r.map_fields(rename)))
        };
        match self {
            DocStat::Count => DocStat::Count,
            DocStat::Constant { value } => DocStat::Constant { value: *value },
            DocStat::Field { field } => DocStat::Field {
                field: rename(field),
            },
            DocStat::HasInt { field, term } => DocStat::HasInt {
                field: rename(field),
                term: *term,
            },
            DocStat::HasString { field, term } => DocStat::HasString {
                field: rename(field),
                term: term.clone(),
            },
            DocStat::Add { left, right } => {
                let (left, right) = pair(left, right);
                DocStat::Add { left, right }
            }
            DocStat::Sub { left, right } => {
                let (left, right) = pair(left, right);
                DocStat::Sub { left, right }
            }
            DocStat::Mul { left, right } => {
                let (left, right) = pair(left, right);
                DocStat::Mul { left, right }
            }
        }
    }
}

impl fmt::Display for DocStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocStat::Count => write!(f, "count()"),
            DocStat::Field { field } => write!(f, "{}", field),
            DocStat::Constant { value } => write!(f, "{}", value),
            DocStat::HasInt { field, term } => write!(f, "hasint({},{})", field, term),
            DocStat::HasString { field, term } => write!(f, "hasstr({},{})", field, term),
            DocStat::Add { left, right } => write!(f, "({}+{})", left, right),
            DocStat::Sub { left, right } => write!(f, "({}-{})", left, right),
            DocStat::Mul { left, right } => write!(f, "({}*{})", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_display() {
        let q = DocQuery::And {
            queries: vec![
                DocQuery::term("country", "us"),
                DocQuery::Not {
                    query: Box::new(DocQuery::IntRange {
                        field: "age".into(),
                        min: 0,
                        max: 18,
                    }),
                },
            ],
        };
        assert_eq!(q.to_string(), "(country:\"us\" AND -(age:[0, 18)))");
    }

    #[test]
    fn test_stat_display() {
        let s = DocStat::Add {
            left: Box::new(DocStat::Count),
            right: Box::new(DocStat::field("clicks")),
        };
        assert_eq!(s.to_string(), "(count()+clicks)");
    }

    #[test]
    fn test_map_fields() {
        let q = DocQuery::term("alias", 1);
        let renamed = q.map_fields(&|f| if f == "alias" { "real".into() } else { f.into() });
        assert_eq!(renamed, DocQuery::term("real", 1));
    }

    #[test]
    fn test_serde_shape() {
        let json = r#"{"type":"term","field":"f","term":3}"#;
        let q: DocQuery = serde_json::from_str(json).unwrap();
        assert_eq!(q, DocQuery::term("f", 3));
        let stat: DocStat = serde_json::from_str(r#"{"type":"count"}"#).unwrap();
        assert_eq!(stat, DocStat::Count);
    }
}
