//! Table orchestration.
//!
//! A [`Table`] owns the filters, sanitizers, subtables and lock predicate
//! registered for one database table and drives them batch by batch:
//!
//! 1. every filter, in registration order, sweeps all batches; records that
//!    are locked or accepted survive, the rest are deleted and the
//!    before/after pair is handed to each subtable;
//! 2. every sanitizer, in registration order, sweeps all batches and rewrites
//!    each record (locked ones included) through the adapter's update.
//!
//! Each pass re-reads the table, so a later filter sees the rows an earlier
//! filter removed.

mod callback;
mod filter;
mod subtable;

pub use callback::{Predicate, Transform};
pub use filter::{Filter, FilterOptions, Sanitizer, SanitizerOptions};
pub use subtable::{SubTable, SubTableOptions};

use crate::condition::Condition;
use crate::database::Database;
use crate::error::ShrinkError;
use crate::pk::{removed_keys, PkValue};
use crate::record::{Batch, Record, Value};
use anyhow::Context;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info};

/// Primary key column used when none is configured
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// How records of a table are identified
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKey {
    Column(String),
    /// Keyless table: only whole-table or foreign-key removal is possible
    None,
}

impl Default for PrimaryKey {
    fn default() -> Self {
        PrimaryKey::Column(DEFAULT_PRIMARY_KEY.to_string())
    }
}

impl PrimaryKey {
    pub fn column(&self) -> Option<&str> {
        match self {
            PrimaryKey::Column(c) => Some(c),
            PrimaryKey::None => None,
        }
    }
}

/// Per-table configuration
#[derive(Debug, Clone, Default)]
pub struct TableOptions {
    pub primary_key: PrimaryKey,
}

impl TableOptions {
    pub fn with_primary_key(column: impl Into<String>) -> Self {
        Self {
            primary_key: PrimaryKey::Column(column.into()),
        }
    }

    pub fn keyless() -> Self {
        Self {
            primary_key: PrimaryKey::None,
        }
    }

    fn validate(&self, table: &str) -> Result<(), ShrinkError> {
        if let PrimaryKey::Column(c) = &self.primary_key {
            if c.trim().is_empty() {
                return Err(ShrinkError::config(format!(
                    "table '{}' has an empty primary key column",
                    table
                )));
            }
        }
        Ok(())
    }
}

/// Read-only view of the registered tables, used to resolve subtables
#[derive(Clone, Copy)]
pub struct Catalog<'a> {
    tables: Option<&'a IndexMap<String, Table>>,
}

impl<'a> Catalog<'a> {
    pub fn new(tables: &'a IndexMap<String, Table>) -> Self {
        Self {
            tables: Some(tables),
        }
    }

    /// A catalog with no tables; every subtable resolves to a stub
    pub fn empty() -> Self {
        Self { tables: None }
    }

    pub fn get(&self, name: &str) -> Option<&'a Table> {
        self.tables.and_then(|t| t.get(name))
    }
}

/// Per-table statistics from a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableStats {
    pub name: String,
    /// Batches swept by filters (one sweep per filter)
    pub filter_batches: u64,
    /// Batches swept by sanitizers (one sweep per sanitizer)
    pub sanitizer_batches: u64,
    /// Rows deleted from this table
    pub rows_removed: u64,
    /// Rows deleted from subtables as a consequence
    pub rows_cascaded: u64,
    /// Records passed through sanitizers
    pub rows_sanitized: u64,
    /// Subtable propagation calls
    pub propagations: u64,
    /// Whether the table was removed wholesale
    pub removed_table: bool,
}

impl TableStats {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn merge(&mut self, other: &TableStats) {
        self.filter_batches += other.filter_batches;
        self.sanitizer_batches += other.sanitizer_batches;
        self.rows_removed += other.rows_removed;
        self.rows_cascaded += other.rows_cascaded;
        self.rows_sanitized += other.rows_sanitized;
        self.propagations += other.propagations;
        self.removed_table |= other.removed_table;
    }

    fn record(&mut self, outcome: FilterOutcome) {
        self.rows_removed += outcome.removed;
        self.rows_cascaded += outcome.cascaded;
        self.propagations += outcome.propagations;
    }
}

/// Rows removed while applying filtering outcomes
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FilterOutcome {
    pub removed: u64,
    pub cascaded: u64,
    pub propagations: u64,
}

impl FilterOutcome {
    fn add(&mut self, other: FilterOutcome) {
        self.removed += other.removed;
        self.cascaded += other.cascaded;
        self.propagations += other.propagations;
    }
}

/// One table and everything registered against it
pub struct Table {
    name: String,
    database: Option<Rc<dyn Database>>,
    options: TableOptions,
    filters: Vec<Filter>,
    sanitizers: Vec<Sanitizer>,
    subtables: Vec<SubTable>,
    lock: Option<Box<dyn Predicate>>,
    remove: bool,
}

impl Table {
    /// Create a table with default options (primary key `id`).
    ///
    /// Without a database the table is a stub: it has no batches and every
    /// write is a no-op.
    pub fn new(name: impl Into<String>, database: Option<Rc<dyn Database>>) -> Self {
        Self {
            name: name.into(),
            database,
            options: TableOptions::default(),
            filters: Vec::new(),
            sanitizers: Vec::new(),
            subtables: Vec::new(),
            lock: None,
            remove: false,
        }
    }

    pub fn with_options(
        name: impl Into<String>,
        database: Option<Rc<dyn Database>>,
        options: TableOptions,
    ) -> Result<Self, ShrinkError> {
        let mut table = Self::new(name, database);
        table.set_options(options)?;
        Ok(table)
    }

    /// Replace the table options.
    ///
    /// Turning a table keyless fails once anything that needs a key is registered.
    pub fn set_options(&mut self, options: TableOptions) -> Result<(), ShrinkError> {
        options.validate(&self.name)?;
        if options.primary_key == PrimaryKey::None
            && (!self.filters.is_empty()
                || !self.sanitizers.is_empty()
                || !self.subtables.is_empty()
                || self.lock.is_some())
        {
            return Err(ShrinkError::config(format!(
                "table '{}' cannot become keyless: filters, sanitizers, subtables and locks need a primary key",
                self.name
            )));
        }
        self.options = options;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &TableOptions {
        &self.options
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.options.primary_key.column()
    }

    pub fn database(&self) -> Option<&Rc<dyn Database>> {
        self.database.as_ref()
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn sanitizers(&self) -> &[Sanitizer] {
        &self.sanitizers
    }

    pub fn subtables(&self) -> &[SubTable] {
        &self.subtables
    }

    fn require_key(&self, what: &str) -> Result<&str, ShrinkError> {
        self.primary_key().ok_or_else(|| {
            ShrinkError::config(format!(
                "table '{}' has no primary key; {} need one",
                self.name, what
            ))
        })
    }

    pub fn register_filter(
        &mut self,
        options: FilterOptions,
        predicate: impl Predicate + 'static,
    ) -> Result<(), ShrinkError> {
        self.require_key("filters")?;
        self.filters.push(Filter::new(options, predicate));
        Ok(())
    }

    pub fn register_sanitizer(
        &mut self,
        options: SanitizerOptions,
        transform: impl Transform + 'static,
    ) -> Result<(), ShrinkError> {
        self.require_key("sanitizers")?;
        self.sanitizers.push(Sanitizer::new(options, transform));
        Ok(())
    }

    pub fn register_subtable(
        &mut self,
        table: impl Into<String>,
        options: SubTableOptions,
    ) -> Result<(), ShrinkError> {
        let table = table.into();
        self.require_key("subtables")?;
        options.validate(&table)?;
        self.subtables.push(SubTable::new(table, options));
        Ok(())
    }

    /// Install the lock predicate, replacing any previous one
    pub fn set_lock(&mut self, predicate: impl Predicate + 'static) -> Result<(), ShrinkError> {
        self.require_key("locks")?;
        self.lock = Some(Box::new(predicate));
        Ok(())
    }

    /// True if a lock predicate is installed and matches the record
    pub fn is_locked(&self, record: &Record) -> bool {
        self.lock.as_ref().is_some_and(|lock| lock.test(record))
    }

    /// Remove every row of this table when filters run
    pub fn mark_for_removal(&mut self) {
        self.remove = true;
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.remove
    }

    /// Run all filters, then all sanitizers
    pub fn run(&self, catalog: &Catalog<'_>) -> anyhow::Result<TableStats> {
        let mut stats = self.run_filters(catalog)?;
        stats.merge(&self.run_sanitizers()?);
        Ok(stats)
    }

    /// Run every filter over every batch, in registration order.
    ///
    /// A table marked for removal is emptied instead.
    pub fn run_filters(&self, catalog: &Catalog<'_>) -> anyhow::Result<TableStats> {
        let mut stats = TableStats::new(&self.name);

        if self.remove {
            let outcome = self.remove_all(catalog)?;
            stats.removed_table = true;
            stats.record(outcome);
            return Ok(stats);
        }

        for (index, filter) in self.filters.iter().enumerate() {
            info!(table = %self.name, filter = filter.name(), "running filter");

            let batches = self
                .for_each_batch(|_, number, batch| {
                    let retained: Batch = batch
                        .iter()
                        .filter(|r| self.is_locked(r) || filter.apply(r))
                        .cloned()
                        .collect();
                    debug!(
                        table = %self.name,
                        batch = number,
                        seen = batch.len(),
                        kept = retained.len(),
                        "filtered batch"
                    );
                    stats.record(self.filter_batch(&batch, &retained, catalog)?);
                    Ok(())
                })
                .with_context(|| {
                    format!(
                        "filter #{} ({}) failed on table '{}'",
                        index + 1,
                        filter.name(),
                        self.name
                    )
                })?;
            stats.filter_batches += batches;
        }

        Ok(stats)
    }

    /// Run every sanitizer over every batch, in registration order
    pub fn run_sanitizers(&self) -> anyhow::Result<TableStats> {
        let mut stats = TableStats::new(&self.name);
        if self.remove {
            return Ok(stats);
        }

        for (index, sanitizer) in self.sanitizers.iter().enumerate() {
            let column = self.require_key("sanitizers")?;
            info!(table = %self.name, sanitizer = sanitizer.name(), "running sanitizer");

            let batches = self
                .for_each_batch(|database, number, batch| {
                    let rewritten: Batch = batch
                        .iter()
                        .map(|r| sanitizer.apply(r.clone()))
                        .collect();
                    database.update_records(&self.name, column, &batch, &rewritten)?;
                    debug!(table = %self.name, batch = number, rows = batch.len(), "sanitized batch");
                    stats.rows_sanitized += batch.len() as u64;
                    Ok(())
                })
                .with_context(|| {
                    format!(
                        "sanitizer #{} ({}) failed on table '{}'",
                        index + 1,
                        sanitizer.name(),
                        self.name
                    )
                })?;
            stats.sanitizer_batches += batches;
        }

        Ok(stats)
    }

    /// Delete every row.
    ///
    /// Without a lock or subtables this is one bulk delete that needs no
    /// primary key. Otherwise rows are visited in batches so locked rows
    /// survive and removals cascade.
    fn remove_all(&self, catalog: &Catalog<'_>) -> anyhow::Result<FilterOutcome> {
        let mut outcome = FilterOutcome::default();
        let Some(database) = self.database.as_deref() else {
            return Ok(outcome);
        };

        if self.lock.is_none() && self.subtables.is_empty() {
            outcome.removed = database
                .delete_records(&self.name, &Condition::All)
                .with_context(|| format!("failed to remove table '{}'", self.name))?;
            info!(table = %self.name, rows = outcome.removed, "removed table");
            return Ok(outcome);
        }

        self.for_each_batch(|_, _, batch| {
            let retained: Batch = batch.iter().filter(|r| self.is_locked(r)).cloned().collect();
            outcome.add(self.filter_batch(&batch, &retained, catalog)?);
            Ok(())
        })
        .with_context(|| format!("failed to remove table '{}'", self.name))?;
        info!(table = %self.name, rows = outcome.removed, "removed table");
        Ok(outcome)
    }

    /// Apply one batch's filtering outcome.
    ///
    /// Records of `batch` missing from `retained` are deleted by primary key,
    /// then the pair is handed to every subtable.
    pub(crate) fn filter_batch(
        &self,
        batch: &[Record],
        retained: &[Record],
        catalog: &Catalog<'_>,
    ) -> anyhow::Result<FilterOutcome> {
        let mut outcome = FilterOutcome::default();
        let Some(database) = self.database.as_deref() else {
            return Ok(outcome);
        };
        let column = self.require_key("filters")?;

        let removed = removed_keys(&self.name, batch, retained, column)?;
        if !removed.is_empty() {
            let condition = Condition::in_values(column, removed.iter().map(PkValue::to_value));
            outcome.removed = database.delete_records(&self.name, &condition)?;
        }

        for subtable in &self.subtables {
            outcome.cascaded += subtable.propagate_filters(self, batch, retained, catalog)?;
            outcome.propagations += 1;
        }

        Ok(outcome)
    }

    /// Remove rows whose `foreign_key` points at one of `parent_keys`.
    ///
    /// Locked rows survive. Keyless tables are cleaned with a single bulk
    /// delete and do not cascade further.
    pub(crate) fn remove_referencing(
        &self,
        foreign_key: &str,
        parent_keys: Vec<Value>,
        catalog: &Catalog<'_>,
    ) -> anyhow::Result<FilterOutcome> {
        let mut outcome = FilterOutcome::default();
        let Some(database) = self.database.as_deref() else {
            return Ok(outcome);
        };

        if self.primary_key().is_none() {
            outcome.removed = database
                .delete_records(&self.name, &Condition::in_values(foreign_key, parent_keys))?;
            return Ok(outcome);
        }

        let chunk_size = database.batch_size().max(1);
        for keys in parent_keys.chunks(chunk_size) {
            let condition = Condition::in_values(foreign_key, keys.iter().cloned());
            let records = database.get_records(&self.name, &condition)?;
            for batch in records.chunks(chunk_size) {
                let retained: Batch = batch.iter().filter(|r| self.is_locked(r)).cloned().collect();
                outcome.add(self.filter_batch(batch, &retained, catalog)?);
            }
        }

        Ok(outcome)
    }

    /// Stream the table's batches into `f`, returning how many were seen
    fn for_each_batch<F>(&self, mut f: F) -> anyhow::Result<u64>
    where
        F: FnMut(&dyn Database, u64, Batch) -> anyhow::Result<()>,
    {
        let Some(database) = self.database.as_deref() else {
            debug!(table = %self.name, "no database bound, nothing to process");
            return Ok(0);
        };

        let mut number = 0;
        for batch in database.batches(&self.name, self.primary_key()) {
            let batch = batch?;
            number += 1;
            f(database, number, batch).with_context(|| format!("at batch {}", number))?;
        }
        Ok(number)
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("has_database", &self.database.is_some())
            .field("filters", &self.filters)
            .field("sanitizers", &self.sanitizers)
            .field("subtables", &self.subtables)
            .field("locked", &self.lock.is_some())
            .field("remove", &self.remove)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::CompareOp;
    use crate::database::MemoryDatabase;

    fn seeded(batch_size: usize, rows: i64) -> Rc<MemoryDatabase> {
        let db = MemoryDatabase::new(batch_size).unwrap();
        for i in 1..=rows {
            db.insert("test_table", Record::new().with("id", i).with("name", "test").with("test", i));
        }
        Rc::new(db)
    }

    fn table_on(db: &Rc<MemoryDatabase>) -> Table {
        let database: Rc<dyn Database> = db.clone();
        Table::new("test_table", Some(database))
    }

    fn test_values(db: &MemoryDatabase) -> Vec<i64> {
        db.records("test_table")
            .iter()
            .filter_map(|r| r.get("test").and_then(Value::as_i64))
            .collect()
    }

    #[test]
    fn test_stub_table_is_noop() {
        let mut table = Table::new("ghost", None);
        table
            .register_filter(FilterOptions::default(), |_: &Record| false)
            .unwrap();
        let stats = table.run(&Catalog::empty()).unwrap();
        assert_eq!(stats.filter_batches, 0);
        assert_eq!(stats.rows_removed, 0);
    }

    #[test]
    fn test_is_locked_without_lock() {
        let table = Table::new("t", None);
        assert!(!table.is_locked(&Record::new().with("id", 1)));
    }

    #[test]
    fn test_filter_removes_rejected_rows() {
        let db = seeded(5, 20);
        let mut table = table_on(&db);
        table
            .register_filter(
                FilterOptions::named("gt5"),
                Condition::compare("test", CompareOp::Gt, 5),
            )
            .unwrap();

        let stats = table.run_filters(&Catalog::empty()).unwrap();
        assert_eq!(stats.filter_batches, 4);
        assert_eq!(stats.rows_removed, 5);
        assert_eq!(test_values(&db), (6..=20).collect::<Vec<_>>());
    }

    #[test]
    fn test_lock_overrides_filter_but_not_sanitizer() {
        let db = seeded(5, 10);
        let mut table = table_on(&db);
        table
            .register_filter(FilterOptions::default(), |_: &Record| false)
            .unwrap();
        table
            .set_lock(Condition::eq("test", 3))
            .unwrap();
        table
            .register_sanitizer(SanitizerOptions::default(), |mut r: Record| {
                r.set("name", "scrubbed");
                r
            })
            .unwrap();

        let stats = table.run(&Catalog::empty()).unwrap();
        assert_eq!(stats.rows_removed, 9);
        assert_eq!(stats.rows_sanitized, 1);

        let rows = db.records("test_table");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("test"), Some(&Value::Integer(3)));
        assert_eq!(rows[0].get("name"), Some(&Value::from("scrubbed")));
    }

    #[test]
    fn test_later_filter_sees_earlier_removals() {
        let db = seeded(4, 10);
        let mut table = table_on(&db);
        table
            .register_filter(FilterOptions::default(), Condition::compare("test", CompareOp::Le, 6))
            .unwrap();

        let seen = Rc::new(std::cell::Cell::new(0));
        let counter = seen.clone();
        table
            .register_filter(FilterOptions::default(), move |_: &Record| {
                counter.set(counter.get() + 1);
                true
            })
            .unwrap();

        table.run_filters(&Catalog::empty()).unwrap();
        assert_eq!(seen.get(), 6);
    }

    #[test]
    fn test_keyless_table_rejects_filters() {
        let mut table = Table::with_options("logs", None, TableOptions::keyless()).unwrap();
        let err = table
            .register_filter(FilterOptions::default(), |_: &Record| true)
            .unwrap_err();
        assert!(matches!(err, ShrinkError::Configuration(_)));
        assert!(table.set_lock(|_: &Record| true).is_err());
        assert!(table
            .register_subtable("child", SubTableOptions::new("log_id"))
            .is_err());
    }

    #[test]
    fn test_empty_primary_key_rejected() {
        let err = Table::with_options("t", None, TableOptions::with_primary_key(" ")).unwrap_err();
        assert!(matches!(err, ShrinkError::Configuration(_)));
    }

    #[test]
    fn test_cannot_turn_keyless_after_registration() {
        let mut table = Table::new("t", None);
        table
            .register_sanitizer(SanitizerOptions::default(), |r: Record| r)
            .unwrap();
        assert!(table.set_options(TableOptions::keyless()).is_err());
    }

    #[test]
    fn test_sanitizer_changing_key_aborts() {
        let db = seeded(5, 10);
        let mut table = table_on(&db);
        table
            .register_sanitizer(SanitizerOptions::named("rekey"), |mut r: Record| {
                let id = r.get("id").and_then(Value::as_i64).unwrap_or_default();
                r.set("id", id * 10);
                r
            })
            .unwrap();

        let err = table.run_sanitizers().unwrap_err();
        let shrink = err.downcast_ref::<ShrinkError>().expect("typed error");
        assert!(matches!(shrink, ShrinkError::ContractViolation { .. }));
        assert!(format!("{:#}", err).contains("rekey"));
        assert_eq!(test_values(&db), (1..=10).collect::<Vec<_>>());
    }

    #[test]
    fn test_remove_marked_table() {
        let db = seeded(5, 12);
        let mut table = table_on(&db);
        table.mark_for_removal();
        let stats = table.run(&Catalog::empty()).unwrap();
        assert!(stats.removed_table);
        assert_eq!(stats.rows_removed, 12);
        assert_eq!(db.count("test_table"), 0);
    }
}
