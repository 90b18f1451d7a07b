//! Database adapters.
//!
//! The table engine only needs batched reads, keyed updates and bulk
//! deletes. [`Database`] captures that capability; [`MemoryDatabase`] keeps
//! tables in process and [`DuckDbDatabase`] works against an embedded DuckDB
//! file.

mod duckdb;
mod memory;

pub use self::duckdb::DuckDbDatabase;
pub use self::memory::MemoryDatabase;

use crate::condition::Condition;
use crate::error::{ShrinkError, ViolationKind};
use crate::pk::{primary_key_of, PkValue};
use crate::record::{Batch, Record, Value};
use indexmap::IndexMap;

/// Batch size used when none is configured
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Reject non-positive batch sizes
pub fn check_batch_size(batch_size: usize) -> Result<usize, ShrinkError> {
    if batch_size == 0 {
        return Err(ShrinkError::config("batch_size must be greater than 0"));
    }
    Ok(batch_size)
}

/// Where the next batch starts
#[derive(Debug, Clone)]
pub struct BatchPosition {
    /// Key column for keyset pagination; None pages by offset
    pub primary_key: Option<String>,
    /// Last key of the previous batch
    pub after: Option<Value>,
    /// Rows already returned (keyless tables)
    pub offset: usize,
    /// Batch size
    pub limit: usize,
}

/// Capability the table engine needs from storage
pub trait Database {
    /// Rows per batch
    fn batch_size(&self) -> usize;

    /// Fetch one batch.
    ///
    /// Keyed tables return rows with key greater than `position.after`, in
    /// key order; keyless tables return rows from `position.offset`.
    fn fetch_batch(&self, table: &str, position: &BatchPosition) -> anyhow::Result<Batch>;

    /// Fetch every record matching a condition
    fn get_records(&self, table: &str, condition: &Condition) -> anyhow::Result<Batch>;

    /// Transition `old` to `new`, matched by primary key.
    ///
    /// Fails with a contract violation, before writing anything, if the sets
    /// differ in size or keys. Removal is never done through this path.
    fn update_records(
        &self,
        table: &str,
        primary_key: &str,
        old: &[Record],
        new: &[Record],
    ) -> anyhow::Result<()>;

    /// Delete every record matching a condition, returning how many went
    fn delete_records(&self, table: &str, condition: &Condition) -> anyhow::Result<u64>;
}

impl dyn Database + '_ {
    /// Lazily iterate over a table in batches.
    ///
    /// For N rows and batch size B this yields ceil(N/B) batches covering
    /// each row once. Keyed tables are paged by key, so deleting rows of the
    /// current batch does not shift the following ones.
    pub fn batches(&self, table: &str, primary_key: Option<&str>) -> Batches<'_> {
        Batches {
            database: self,
            table: table.to_string(),
            position: BatchPosition {
                primary_key: primary_key.map(str::to_string),
                after: None,
                offset: 0,
                limit: self.batch_size(),
            },
            done: false,
        }
    }
}

/// Iterator over a table's batches
pub struct Batches<'a> {
    database: &'a dyn Database,
    table: String,
    position: BatchPosition,
    done: bool,
}

impl Iterator for Batches<'_> {
    type Item = anyhow::Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let batch = match self.database.fetch_batch(&self.table, &self.position) {
            Ok(batch) => batch,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        if batch.is_empty() {
            self.done = true;
            return None;
        }
        if batch.len() < self.position.limit {
            self.done = true;
        }

        match &self.position.primary_key {
            Some(column) => match batch.last().and_then(|r| r.get(column)) {
                Some(key) if !key.is_null() => self.position.after = Some(key.clone()),
                _ => {
                    self.done = true;
                    return Some(Err(ShrinkError::MissingPrimaryKey {
                        table: self.table.clone(),
                        column: column.clone(),
                    }
                    .into()));
                }
            },
            None => self.position.offset += batch.len(),
        }

        Some(Ok(batch))
    }
}

/// Validate an update and pair each old record with its replacement.
///
/// Only pairs whose contents differ are returned. Adapters call this before
/// writing so a violation leaves storage untouched.
pub fn plan_update<'a>(
    table: &str,
    primary_key: &str,
    old: &'a [Record],
    new: &'a [Record],
) -> Result<Vec<(PkValue, &'a Record, &'a Record)>, ShrinkError> {
    if old.len() != new.len() {
        return Err(ShrinkError::violation(
            table,
            ViolationKind::CardinalityChanged {
                old: old.len(),
                new: new.len(),
            },
        ));
    }

    let mut new_by_key: IndexMap<PkValue, &Record> = IndexMap::with_capacity(new.len());
    for record in new {
        let key = primary_key_of(table, record, primary_key)?;
        if new_by_key.insert(key.clone(), record).is_some() {
            return Err(ShrinkError::violation(
                table,
                ViolationKind::DuplicatePrimaryKey { key },
            ));
        }
    }

    let mut seen: crate::pk::PkSet = crate::pk::PkSet::with_capacity(old.len());
    let mut changes = Vec::new();
    for (index, record) in old.iter().enumerate() {
        let key = primary_key_of(table, record, primary_key)?;
        if !seen.insert(key.clone()) {
            return Err(ShrinkError::violation(
                table,
                ViolationKind::DuplicatePrimaryKey { key },
            ));
        }

        let Some(replacement) = new_by_key.get(&key) else {
            // Report the positional partner's key when it is a key we never had
            let partner = primary_key_of(table, &new[index], primary_key)?;
            let kind = if old
                .iter()
                .any(|r| primary_key_of(table, r, primary_key).ok().as_ref() == Some(&partner))
            {
                ViolationKind::RecordRemoved { key }
            } else {
                ViolationKind::PrimaryKeyChanged {
                    old: key,
                    new: partner,
                }
            };
            return Err(ShrinkError::violation(table, kind));
        };

        if *replacement != record {
            changes.push((key, record, *replacement));
        }
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, test: i64) -> Record {
        Record::new().with("id", id).with("test", test)
    }

    #[test]
    fn test_plan_update_returns_changed_pairs() {
        let old = vec![row(1, 1), row(2, 2), row(3, 3)];
        let new = vec![row(3, 3), row(1, 10), row(2, 2)];

        let changes = plan_update("t", "id", &old, &new).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, PkValue::Int(1));
        assert_eq!(changes[0].2.get("test"), Some(&Value::Integer(10)));
    }

    #[test]
    fn test_plan_update_rejects_shrinkage() {
        let old = vec![row(1, 1), row(2, 2)];
        let new = vec![row(1, 1)];
        let err = plan_update("t", "id", &old, &new).unwrap_err();
        assert_eq!(
            err.violation_kind(),
            Some(&ViolationKind::CardinalityChanged { old: 2, new: 1 })
        );
    }

    #[test]
    fn test_plan_update_rejects_key_change() {
        let old = vec![row(1, 1), row(2, 2)];
        let new = vec![row(10, 1), row(20, 2)];
        let err = plan_update("t", "id", &old, &new).unwrap_err();
        assert_eq!(
            err.violation_kind(),
            Some(&ViolationKind::PrimaryKeyChanged {
                old: PkValue::Int(1),
                new: PkValue::Int(10),
            })
        );
    }

    #[test]
    fn test_plan_update_rejects_duplicates() {
        let old = vec![row(1, 1), row(2, 2)];
        let new = vec![row(1, 1), row(1, 2)];
        let err = plan_update("t", "id", &old, &new).unwrap_err();
        assert!(matches!(
            err.violation_kind(),
            Some(ViolationKind::DuplicatePrimaryKey { .. })
        ));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        assert!(check_batch_size(0).is_err());
        assert_eq!(check_batch_size(5).unwrap(), 5);
    }
}
