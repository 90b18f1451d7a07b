//! Database-level coordination of table runs.
//!
//! A [`Shrinker`] owns every configured [`Table`] in registration order and
//! runs the filter pass over all of them before the sanitizer pass, so
//! sanitizers only touch rows that survived filtering and cascading.

use crate::database::Database;
use crate::error::ShrinkError;
use crate::table::{Catalog, Table, TableOptions, TableStats};
use anyhow::Context;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;
use tracing::{info, warn};

/// Which pass a progress notification belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    Filter,
    Sanitize,
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pass::Filter => f.write_str("filtering"),
            Pass::Sanitize => f.write_str("sanitizing"),
        }
    }
}

/// Statistics from a shrink run
#[derive(Debug, Default, Serialize)]
pub struct ShrinkStats {
    /// Number of tables processed
    pub tables_processed: usize,
    /// Number of tables emptied by removal
    pub tables_removed: usize,
    /// Rows deleted by filters and removals
    pub rows_removed: u64,
    /// Rows deleted from subtables by cascades
    pub rows_cascaded: u64,
    /// Rows passed through sanitizers
    pub rows_sanitized: u64,
    /// Tables skipped by --tables/--exclude
    pub tables_skipped: Vec<String>,
    /// Per-table statistics
    pub table_stats: Vec<TableStats>,
}

impl ShrinkStats {
    fn add(&mut self, stats: TableStats) {
        match self.table_stats.iter_mut().find(|t| t.name == stats.name) {
            Some(existing) => existing.merge(&stats),
            None => self.table_stats.push(stats),
        }
        self.tables_processed = self.table_stats.len();
        self.tables_removed = self.table_stats.iter().filter(|t| t.removed_table).count();
        self.rows_removed = self.table_stats.iter().map(|t| t.rows_removed).sum();
        self.rows_cascaded = self.table_stats.iter().map(|t| t.rows_cascaded).sum();
        self.rows_sanitized = self.table_stats.iter().map(|t| t.rows_sanitized).sum();
    }

    fn merge(&mut self, other: ShrinkStats) {
        for stats in other.table_stats {
            self.add(stats);
        }
        for name in other.tables_skipped {
            if !self.tables_skipped.contains(&name) {
                self.tables_skipped.push(name);
            }
        }
    }
}

type ProgressFn = Box<dyn Fn(&str, Pass)>;

/// Registry of tables sharing one database
pub struct Shrinker {
    database: Option<Rc<dyn Database>>,
    tables: IndexMap<String, Table>,
    include: Option<Vec<String>>,
    exclude: Vec<String>,
    progress: Option<ProgressFn>,
}

impl Shrinker {
    pub fn new(database: Option<Rc<dyn Database>>) -> Self {
        Self {
            database,
            tables: IndexMap::new(),
            include: None,
            exclude: Vec::new(),
            progress: None,
        }
    }

    pub fn database(&self) -> Option<&Rc<dyn Database>> {
        self.database.as_ref()
    }

    /// Get a table, registering it with default options on first use
    pub fn table(&mut self, name: &str) -> &mut Table {
        let database = self.database.clone();
        self.tables
            .entry(name.to_string())
            .or_insert_with(|| Table::new(name, database))
    }

    /// Register (or reconfigure) a table to filter and sanitize
    pub fn filter_table(
        &mut self,
        name: &str,
        options: TableOptions,
    ) -> Result<&mut Table, ShrinkError> {
        let table = self.table(name);
        table.set_options(options)?;
        Ok(table)
    }

    /// Mark a table to be emptied during the filter pass
    pub fn remove_table(&mut self, name: &str, options: TableOptions) -> Result<(), ShrinkError> {
        let table = self.filter_table(name, options)?;
        if !table.filters().is_empty() || !table.sanitizers().is_empty() {
            return Err(ShrinkError::config(format!(
                "table '{}' is removed, it cannot also have filters or sanitizers",
                name
            )));
        }
        table.mark_for_removal();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Registered tables in registration order
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Restrict which tables the passes run on.
    ///
    /// Skipped tables still act as subtable children, so cascades into them
    /// keep the data consistent.
    pub fn select_tables(&mut self, include: Option<Vec<String>>, exclude: Vec<String>) {
        self.include = include;
        self.exclude = exclude;
    }

    /// Call `f` before each table of each pass
    pub fn with_progress(mut self, f: impl Fn(&str, Pass) + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    /// Run filters (and removals) on every selected table
    pub fn filter(&self) -> anyhow::Result<ShrinkStats> {
        let catalog = Catalog::new(&self.tables);
        self.each_table(Pass::Filter, |table| table.run_filters(&catalog))
    }

    /// Run sanitizers on every selected table
    pub fn sanitize(&self) -> anyhow::Result<ShrinkStats> {
        self.each_table(Pass::Sanitize, Table::run_sanitizers)
    }

    /// Filter every table, then sanitize every table
    pub fn shrink(&self) -> anyhow::Result<ShrinkStats> {
        let mut stats = self.filter()?;
        stats.merge(self.sanitize()?);
        info!(
            tables = stats.tables_processed,
            removed = stats.rows_removed,
            cascaded = stats.rows_cascaded,
            sanitized = stats.rows_sanitized,
            "shrink complete"
        );
        Ok(stats)
    }

    fn each_table<F>(&self, pass: Pass, mut run: F) -> anyhow::Result<ShrinkStats>
    where
        F: FnMut(&Table) -> anyhow::Result<TableStats>,
    {
        if self.database.is_none() {
            warn!("no database bound, every table is an empty stub");
        }

        let mut stats = ShrinkStats::default();
        for table in self.tables.values() {
            if self.should_skip_table(table.name()) {
                if !stats.tables_skipped.iter().any(|n| n == table.name()) {
                    stats.tables_skipped.push(table.name().to_string());
                }
                continue;
            }
            if let Some(progress) = &self.progress {
                progress(table.name(), pass);
            }
            info!(table = table.name(), %pass, "processing table");
            let table_stats =
                run(table).with_context(|| format!("{} table '{}' failed", pass, table.name()))?;
            stats.add(table_stats);
        }
        Ok(stats)
    }

    /// Check if a table should be skipped
    fn should_skip_table(&self, name: &str) -> bool {
        if self.exclude.iter().any(|e| e.eq_ignore_ascii_case(name)) {
            return true;
        }

        if let Some(ref tables) = self.include {
            if !tables.iter().any(|t| t.eq_ignore_ascii_case(name)) {
                return true;
            }
        }

        false
    }
}

impl fmt::Debug for Shrinker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shrinker")
            .field("has_database", &self.database.is_some())
            .field("tables", &self.tables)
            .field("include", &self.include)
            .field("exclude", &self.exclude)
            .finish_non_exhaustive()
    }
}
