//! In-process adapter holding tables as vectors of records.
//!
//! Used by tests and by callers embedding the engine over data they already
//! hold in memory. Rows keep insertion order; keyed batches are served in
//! key order.

use super::{check_batch_size, plan_update, BatchPosition, Database};
use crate::condition::Condition;
use crate::error::ShrinkError;
use crate::pk::{primary_key_of, PkValue};
use crate::record::{Batch, Record};
use indexmap::IndexMap;
use std::cell::RefCell;

#[derive(Debug)]
pub struct MemoryDatabase {
    batch_size: usize,
    tables: RefCell<IndexMap<String, Vec<Record>>>,
}

impl MemoryDatabase {
    pub fn new(batch_size: usize) -> Result<Self, ShrinkError> {
        Ok(Self {
            batch_size: check_batch_size(batch_size)?,
            tables: RefCell::new(IndexMap::new()),
        })
    }

    /// Create an empty table if it does not exist
    pub fn create_table(&self, table: &str) {
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default();
    }

    /// Append a record, creating the table on first use
    pub fn insert(&self, table: &str, record: Record) {
        self.tables
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    /// Snapshot of a table's rows in insertion order
    pub fn records(&self, table: &str) -> Vec<Record> {
        self.tables
            .borrow()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn count(&self, table: &str) -> usize {
        self.tables.borrow().get(table).map_or(0, Vec::len)
    }

    fn with_table<T>(
        &self,
        table: &str,
        f: impl FnOnce(&mut Vec<Record>) -> anyhow::Result<T>,
    ) -> anyhow::Result<T> {
        let mut tables = self.tables.borrow_mut();
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| ShrinkError::UnknownTable(table.to_string()))?;
        f(rows)
    }
}

impl Database for MemoryDatabase {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn fetch_batch(&self, table: &str, position: &BatchPosition) -> anyhow::Result<Batch> {
        self.with_table(table, |rows| {
            let Some(column) = position.primary_key.as_deref() else {
                return Ok(rows
                    .iter()
                    .skip(position.offset)
                    .take(position.limit)
                    .cloned()
                    .collect());
            };

            let after = position.after.as_ref().and_then(PkValue::from_value);
            let mut keyed: Vec<(PkValue, &Record)> = Vec::with_capacity(rows.len());
            for record in rows.iter() {
                let key = primary_key_of(table, record, column)?;
                if after.as_ref().is_none_or(|a| key > *a) {
                    keyed.push((key, record));
                }
            }
            keyed.sort_by(|a, b| a.0.cmp(&b.0));

            Ok(keyed
                .into_iter()
                .take(position.limit)
                .map(|(_, r)| r.clone())
                .collect())
        })
    }

    fn get_records(&self, table: &str, condition: &Condition) -> anyhow::Result<Batch> {
        self.with_table(table, |rows| {
            Ok(rows
                .iter()
                .filter(|r| condition.matches(r))
                .cloned()
                .collect())
        })
    }

    fn update_records(
        &self,
        table: &str,
        primary_key: &str,
        old: &[Record],
        new: &[Record],
    ) -> anyhow::Result<()> {
        let changes = plan_update(table, primary_key, old, new)?;
        if changes.is_empty() {
            return Ok(());
        }

        self.with_table(table, |rows| {
            for (key, _, replacement) in changes {
                let slot = rows.iter_mut().find(|r| {
                    r.get(primary_key)
                        .and_then(PkValue::from_value)
                        .is_some_and(|k| k == key)
                });
                // Rows deleted since the batch was fetched stay deleted
                if let Some(slot) = slot {
                    *slot = replacement.clone();
                }
            }
            Ok(())
        })
    }

    fn delete_records(&self, table: &str, condition: &Condition) -> anyhow::Result<u64> {
        self.with_table(table, |rows| {
            let before = rows.len();
            rows.retain(|r| !condition.matches(r));
            Ok((before - rows.len()) as u64)
        })
    }
}
