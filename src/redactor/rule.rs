//! Column redaction rules.

use crate::redactor::StrategyKind;
use serde::{Deserialize, Serialize};

/// A single redaction rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Column pattern (glob pattern like "*.email", "users.ssn" or "*phone*")
    pub column: String,
    /// Redaction strategy
    #[serde(flatten)]
    pub strategy: StrategyKind,
}

impl Rule {
    pub fn new(column: impl Into<String>, strategy: StrategyKind) -> Self {
        Self {
            column: column.into(),
            strategy,
        }
    }

    /// Validate the rule
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.column.is_empty() {
            anyhow::bail!("Rule column pattern cannot be empty");
        }
        self.strategy.validate()
    }
}
