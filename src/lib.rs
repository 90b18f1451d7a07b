//! Shrink and sanitize databases into small, privacy-safe copies.
//!
//! Tables are walked in batches through a [`Database`] adapter. Filters
//! decide which rows survive, a lock predicate protects rows from removal,
//! subtables cascade removals to dependent tables, and sanitizers rewrite the
//! rows that remain.
//!
//! ```no_run
//! use dbshrink::{Condition, Database, MemoryDatabase, Record, Shrinker, SubTableOptions};
//! use dbshrink::condition::CompareOp;
//! use std::rc::Rc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let db = Rc::new(MemoryDatabase::new(1000)?);
//! db.insert("users", Record::new().with("id", 1).with("active", true));
//!
//! let database: Rc<dyn Database> = db.clone();
//! let mut shrinker = Shrinker::new(Some(database));
//! let users = shrinker.table("users");
//! users.register_filter(Default::default(), Condition::eq("active", true))?;
//! users.register_subtable("orders", SubTableOptions::new("user_id"))?;
//! users.set_lock(Condition::compare("id", CompareOp::Le, 10))?;
//!
//! let stats = shrinker.shrink()?;
//! println!("removed {} rows", stats.rows_removed);
//! # Ok(())
//! # }
//! ```

pub mod condition;
pub mod config;
pub mod database;
pub mod error;
pub mod pk;
pub mod record;
pub mod redactor;
pub mod shrinker;
pub mod table;

pub use condition::Condition;
pub use config::ShrinkConfig;
pub use database::{Database, DuckDbDatabase, MemoryDatabase};
pub use error::{ShrinkError, ViolationKind};
pub use record::{Batch, Record, Value};
pub use shrinker::{ShrinkStats, Shrinker};
pub use table::{
    Catalog, FilterOptions, PrimaryKey, SanitizerOptions, SubTableOptions, Table, TableOptions,
    TableStats,
};
