//! Primary key values and key sets.
//!
//! Keys are restricted to integers and text so they can be hashed and
//! ordered; batches of keyed tables are paginated in key order.

use crate::error::ShrinkError;
use crate::record::{Record, Value};
use ahash::AHashSet;
use std::fmt;

/// A hashable, ordered primary key value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PkValue {
    Int(i64),
    Text(String),
}

impl PkValue {
    /// Convert a column value into a key, or None for NULL/float/bool/bytes
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Integer(i) => Some(PkValue::Int(*i)),
            Value::Text(s) => Some(PkValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            PkValue::Int(i) => Value::Integer(*i),
            PkValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

impl fmt::Display for PkValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PkValue::Int(i) => write!(f, "{}", i),
            PkValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// Set of primary keys for membership checks
pub type PkSet = AHashSet<PkValue>;

/// Extract the primary key of a record
pub fn primary_key_of(table: &str, record: &Record, column: &str) -> Result<PkValue, ShrinkError> {
    record
        .get(column)
        .and_then(PkValue::from_value)
        .ok_or_else(|| ShrinkError::MissingPrimaryKey {
            table: table.to_string(),
            column: column.to_string(),
        })
}

/// Extract the primary keys of a set of records, in order
pub fn collect_keys(
    table: &str,
    records: &[Record],
    column: &str,
) -> Result<Vec<PkValue>, ShrinkError> {
    records
        .iter()
        .map(|r| primary_key_of(table, r, column))
        .collect()
}

/// Keys of `old` that are absent from `new`, in `old` order.
///
/// This is the set of records a filter pass just discarded.
pub fn removed_keys(
    table: &str,
    old: &[Record],
    new: &[Record],
    column: &str,
) -> Result<Vec<PkValue>, ShrinkError> {
    let kept: PkSet = collect_keys(table, new, column)?.into_iter().collect();
    Ok(collect_keys(table, old, column)?
        .into_iter()
        .filter(|k| !kept.contains(k))
        .collect())
}
