//! Declarative row conditions.
//!
//! A [`Condition`] is the `where` clause of record retrieval and bulk
//! deletion. It evaluates in memory against a [`Record`] and adapters render
//! it to their own query language, so the two must agree: comparisons
//! involving NULL or mismatched types are false, never unknown.
//!
//! Conditions are also the predicates of YAML-configured filters and locks.

use crate::error::ShrinkError;
use crate::record::{Record, Value};
use regex::Regex;
use serde::Deserialize;
use std::cmp::Ordering;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Whether an ordering between column and operand satisfies the operator
    pub fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A compiled regular expression, deserialized from its source string
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self(Regex::new(source)?))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }
}

impl TryFrom<String> for Pattern {
    type Error = regex::Error;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Pattern::new(&source)
    }
}

/// A condition over a single record
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Matches every record
    All,
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    In {
        column: String,
        values: Vec<Value>,
    },
    /// Inclusive range
    Between {
        column: String,
        low: Value,
        high: Value,
    },
    IsNull(String),
    NotNull(String),
    /// Regex match against the column's string form
    Matches {
        column: String,
        pattern: Pattern,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn compare(column: impl Into<String>, op: CompareOp, value: impl Into<Value>) -> Self {
        Condition::Compare {
            column: column.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::compare(column, CompareOp::Eq, value)
    }

    pub fn in_values<I, V>(column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Condition::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn between(
        column: impl Into<String>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> Self {
        Condition::Between {
            column: column.into(),
            low: low.into(),
            high: high.into(),
        }
    }

    pub fn negate(self) -> Self {
        Condition::Not(Box::new(self))
    }

    /// Evaluate against a record
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Condition::All => true,
            Condition::Compare { column, op, value } => record
                .get(column)
                .and_then(|v| v.compare(value))
                .is_some_and(|ord| op.holds(ord)),
            Condition::In { column, values } => record.get(column).is_some_and(|v| {
                values
                    .iter()
                    .any(|candidate| v.compare(candidate) == Some(Ordering::Equal))
            }),
            Condition::Between { column, low, high } => record.get(column).is_some_and(|v| {
                v.compare(low).is_some_and(|o| o != Ordering::Less)
                    && v.compare(high).is_some_and(|o| o != Ordering::Greater)
            }),
            Condition::IsNull(column) => record.get(column).is_none_or(Value::is_null),
            Condition::NotNull(column) => record.get(column).is_some_and(|v| !v.is_null()),
            Condition::Matches { column, pattern } => record
                .get(column)
                .filter(|v| !v.is_null())
                .is_some_and(|v| pattern.is_match(&v.to_string_value())),
            Condition::And(conditions) => conditions.iter().all(|c| c.matches(record)),
            Condition::Or(conditions) => conditions.iter().any(|c| c.matches(record)),
            Condition::Not(condition) => !condition.matches(record),
        }
    }

    /// Reject conditions naming empty columns
    pub fn validate(&self) -> Result<(), ShrinkError> {
        let column = match self {
            Condition::All => return Ok(()),
            Condition::Compare { column, .. }
            | Condition::In { column, .. }
            | Condition::Between { column, .. }
            | Condition::IsNull(column)
            | Condition::NotNull(column)
            | Condition::Matches { column, .. } => column,
            Condition::And(conditions) | Condition::Or(conditions) => {
                return conditions.iter().try_for_each(Condition::validate);
            }
            Condition::Not(condition) => return condition.validate(),
        };
        if column.trim().is_empty() {
            return Err(ShrinkError::config("condition column cannot be empty"));
        }
        Ok(())
    }
}
