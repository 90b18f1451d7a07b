//! Subtable propagation.
//!
//! A subtable declares that a child table references the parent through a
//! foreign key. When a filter pass removes parent rows, the child rows that
//! point at them are removed too (unless the child locks them), and the child
//! cascades further down its own subtables.

use super::{Catalog, Table};
use crate::error::ShrinkError;
use crate::pk::{removed_keys, PkValue};
use crate::record::Record;
use anyhow::Context;
use tracing::debug;

/// How a child table references its parent
#[derive(Debug, Clone, Default)]
pub struct SubTableOptions {
    /// Column of the child table holding the parent's key
    pub foreign_key: String,
    /// Column of the parent table being referenced (defaults to the parent's primary key)
    pub primary_key: Option<String>,
}

impl SubTableOptions {
    pub fn new(foreign_key: impl Into<String>) -> Self {
        Self {
            foreign_key: foreign_key.into(),
            primary_key: None,
        }
    }

    /// Reference a parent column other than its primary key
    pub fn referencing(mut self, parent_column: impl Into<String>) -> Self {
        self.primary_key = Some(parent_column.into());
        self
    }

    pub(crate) fn validate(&self, child: &str) -> Result<(), ShrinkError> {
        if self.foreign_key.trim().is_empty() {
            return Err(ShrinkError::config(format!(
                "subtable '{}' needs a foreign_key column",
                child
            )));
        }
        if self
            .primary_key
            .as_deref()
            .is_some_and(|c| c.trim().is_empty())
        {
            return Err(ShrinkError::config(format!(
                "subtable '{}' has an empty primary_key column",
                child
            )));
        }
        Ok(())
    }
}

/// A dependency from a parent table to a child table
#[derive(Debug, Clone)]
pub struct SubTable {
    table: String,
    options: SubTableOptions,
}

impl SubTable {
    pub fn new(table: impl Into<String>, options: SubTableOptions) -> Self {
        Self {
            table: table.into(),
            options,
        }
    }

    /// Name of the child table
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn options(&self) -> &SubTableOptions {
        &self.options
    }

    /// Propagate one parent batch's filtering outcome to the child.
    ///
    /// `old` is the batch as fetched and `new` the records the parent kept.
    /// Returns the number of rows removed in the child and, recursively,
    /// in its own subtables.
    pub fn propagate_filters(
        &self,
        parent: &Table,
        old: &[Record],
        new: &[Record],
        catalog: &Catalog<'_>,
    ) -> anyhow::Result<u64> {
        let parent_column = self
            .options
            .primary_key
            .as_deref()
            .or(parent.primary_key())
            .ok_or_else(|| {
                ShrinkError::config(format!(
                    "table '{}' has no primary key to propagate to '{}'",
                    parent.name(),
                    self.table
                ))
            })?;

        let removed = removed_keys(parent.name(), old, new, parent_column)?;
        if removed.is_empty() {
            return Ok(0);
        }

        // Unregistered children inherit the parent's database with default options
        let stub;
        let child = match catalog.get(&self.table) {
            Some(table) => table,
            None => {
                stub = Table::new(self.table.clone(), parent.database().cloned());
                &stub
            }
        };

        debug!(
            parent = parent.name(),
            child = %self.table,
            foreign_key = %self.options.foreign_key,
            parent_rows = removed.len(),
            "cascading removal"
        );

        let outcome = child
            .remove_referencing(
                &self.options.foreign_key,
                removed.iter().map(PkValue::to_value).collect(),
                catalog,
            )
            .with_context(|| {
                format!(
                    "failed to cascade from '{}' to '{}'",
                    parent.name(),
                    self.table
                )
            })?;

        Ok(outcome.removed + outcome.cascaded)
    }
}
