//! Column redaction for sanitizers.
//!
//! This module provides:
//! - Column redaction rules with glob column patterns
//! - Redaction strategies (null, constant, hash, mask, fake, skip)
//! - [`ColumnSanitizer`], a record transform applying the first matching
//!   rule to each column
//!
//! Random strategies draw from an RNG seeded per record and column, so a run
//! with the same seed rewrites the same row the same way regardless of batch
//! boundaries or processing order.

mod matcher;
mod rule;
pub mod strategy;

pub use matcher::ColumnMatcher;
pub use rule::Rule;
pub use strategy::{Strategy, StrategyKind};

use crate::record::{Record, Value};
use crate::table::Transform;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

/// Rewrites the columns of a record that match redaction rules.
///
/// The primary key column is never rewritten, whatever the rules say.
#[derive(Debug)]
pub struct ColumnSanitizer {
    table: String,
    primary_key: String,
    matcher: ColumnMatcher,
    seed: u64,
}

impl ColumnSanitizer {
    pub fn new(
        table: impl Into<String>,
        primary_key: impl Into<String>,
        rules: &[Rule],
        seed: u64,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            table: table.into(),
            primary_key: primary_key.into(),
            matcher: ColumnMatcher::new(rules)?,
            seed,
        })
    }

    /// RNG for one cell, derived from seed, table, column and row key
    fn rng_for(&self, column: &str, key: &str) -> rand::rngs::StdRng {
        let mut hasher = Sha256::new();
        hasher.update(self.seed.to_le_bytes());
        for part in [self.table.as_str(), column, key] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&hasher.finalize());
        rand::rngs::StdRng::from_seed(seed)
    }
}

impl Transform for ColumnSanitizer {
    fn apply(&self, mut record: Record) -> Record {
        let key = record
            .get(&self.primary_key)
            .map(Value::to_string_value)
            .unwrap_or_default();

        for (column, value) in record.iter_mut() {
            if column == self.primary_key {
                continue;
            }
            if let Some(strategy) = self.matcher.strategy_for(&self.table, column) {
                let mut rng = self.rng_for(column, &key);
                *value = strategy.apply(value, &mut rng);
            }
        }

        record
    }
}
