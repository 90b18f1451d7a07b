//! YAML configuration for a shrink run.
//!
//! ```yaml
//! batch_size: 500
//! seed: 42
//! tables:
//!   users:
//!     lock:
//!       compare: { column: role, op: eq, value: admin }
//!     filters:
//!       - name: recent
//!         keep:
//!           compare: { column: created_at, op: ge, value: "2024-01-01" }
//!     sanitizers:
//!       - rules:
//!           - column: email
//!             strategy: hash
//!             preserve_domain: true
//!     subtables:
//!       - table: orders
//!         foreign_key: user_id
//!   sessions:
//!     remove: true
//!     primary_key: false
//! ```

use crate::condition::Condition;
use crate::database::{check_batch_size, Database, DEFAULT_BATCH_SIZE};
use crate::error::ShrinkError;
use crate::redactor::{ColumnSanitizer, Rule};
use crate::shrinker::Shrinker;
use crate::table::{
    FilterOptions, PrimaryKey, SanitizerOptions, SubTableOptions, TableOptions,
    DEFAULT_PRIMARY_KEY,
};
use anyhow::Context;
use indexmap::IndexMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::rc::Rc;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShrinkConfig {
    /// Rows per batch (default 1000)
    pub batch_size: Option<usize>,
    /// Seed for random redaction strategies
    pub seed: Option<u64>,
    /// Tables in processing order
    pub tables: IndexMap<String, TableConfig>,
}

/// Configuration of one table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TableConfig {
    pub primary_key: Option<PrimaryKeySetting>,
    /// Rows matching this are never removed by filters or cascades
    pub lock: Option<Condition>,
    pub filters: Vec<FilterConfig>,
    pub sanitizers: Vec<SanitizerConfig>,
    pub subtables: Vec<SubTableConfig>,
    /// Empty the table during the filter pass
    pub remove: bool,
}

/// `primary_key: <column>` or `primary_key: false` for keyless tables
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKeySetting {
    Flag(bool),
    Column(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// Rows matching this condition are kept
    pub keep: Condition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SanitizerConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub rules: Vec<Rule>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubTableConfig {
    /// Child table name
    pub table: String,
    /// Child column referencing the parent
    pub foreign_key: String,
    /// Parent column referenced (defaults to the parent's primary key)
    #[serde(default)]
    pub primary_key: Option<String>,
}

impl TableConfig {
    pub fn options(&self) -> TableOptions {
        let primary_key = match &self.primary_key {
            None | Some(PrimaryKeySetting::Flag(true)) => {
                PrimaryKey::Column(DEFAULT_PRIMARY_KEY.to_string())
            }
            Some(PrimaryKeySetting::Flag(false)) => PrimaryKey::None,
            Some(PrimaryKeySetting::Column(column)) => PrimaryKey::Column(column.clone()),
        };
        TableOptions { primary_key }
    }
}

impl ShrinkConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: ShrinkConfig = serde_yaml_ng::from_str(yaml)?;
        Ok(config)
    }

    /// Batch size to open the database with
    pub fn batch_size(&self) -> usize {
        self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// Seed from the command line, else the file, else random
    pub fn resolve_seed(&self, cli_seed: Option<u64>) -> u64 {
        cli_seed.or(self.seed).unwrap_or_else(rand::random)
    }

    /// Check everything that can be checked without a database
    pub fn validate(&self) -> anyhow::Result<()> {
        self.build(None, 0).map(|_| ())
    }

    /// Build a shrinker over `database`
    pub fn build(&self, database: Option<Rc<dyn Database>>, seed: u64) -> anyhow::Result<Shrinker> {
        check_batch_size(self.batch_size())?;

        let mut shrinker = Shrinker::new(database);
        for (name, table) in &self.tables {
            Self::build_table(&mut shrinker, name, table, seed)
                .with_context(|| format!("Invalid configuration for table '{}'", name))?;
        }
        Ok(shrinker)
    }

    fn build_table(
        shrinker: &mut Shrinker,
        name: &str,
        config: &TableConfig,
        seed: u64,
    ) -> anyhow::Result<()> {
        if config.remove {
            if !config.filters.is_empty() || !config.sanitizers.is_empty() {
                return Err(ShrinkError::config(
                    "a removed table cannot also have filters or sanitizers",
                )
                .into());
            }
            shrinker.remove_table(name, config.options())?;
        } else {
            shrinker.filter_table(name, config.options())?;
        }

        let table = shrinker.table(name);

        if let Some(lock) = &config.lock {
            lock.validate()?;
            table.set_lock(lock.clone())?;
        }

        for filter in &config.filters {
            filter.keep.validate()?;
            let options = FilterOptions {
                name: filter.name.clone(),
            };
            table.register_filter(options, filter.keep.clone())?;
        }

        for (index, sanitizer) in config.sanitizers.iter().enumerate() {
            let primary_key = table
                .primary_key()
                .map(str::to_string)
                .ok_or_else(|| ShrinkError::config("sanitizers need a primary key"))?;
            let transform = ColumnSanitizer::new(name, primary_key, &sanitizer.rules, seed)
                .with_context(|| format!("Invalid rules in sanitizer #{}", index + 1))?;
            let options = SanitizerOptions {
                name: sanitizer.name.clone(),
            };
            table.register_sanitizer(options, transform)?;
        }

        for subtable in &config.subtables {
            let mut options = SubTableOptions::new(subtable.foreign_key.clone());
            options.primary_key = subtable.primary_key.clone();
            table.register_subtable(subtable.table.clone(), options)?;
        }

        Ok(())
    }
}
