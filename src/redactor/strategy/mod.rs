//! Redaction strategies for sanitizing column values.
//!
//! Each strategy implements a different approach to redacting values:
//! - `null`: Replace with NULL
//! - `constant`: Replace with a fixed value
//! - `hash`: One-way hash (deterministic)
//! - `mask`: Partial masking with pattern
//! - `fake`: Generate realistic fake data
//! - `skip`: No redaction (passthrough)

mod constant;
mod fake;
mod hash;
mod mask;
mod null;
mod skip;

pub use constant::ConstantStrategy;
pub use fake::{FakeGenerator, FakeStrategy};
pub use hash::HashStrategy;
pub use mask::MaskStrategy;
pub use null::NullStrategy;
pub use skip::SkipStrategy;

use crate::record::Value;
use serde::{Deserialize, Serialize};

/// Redaction strategy kind with associated configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum StrategyKind {
    /// Replace value with NULL
    Null,

    /// Replace with a constant value
    Constant {
        /// The constant value to use; numbers stay numbers
        value: Value,
    },

    /// One-way hash (SHA256)
    Hash {
        /// Preserve email domain (user@domain.com → hash@domain.com)
        #[serde(default)]
        preserve_domain: bool,
    },

    /// Partial masking with pattern
    Mask {
        /// Pattern: * = asterisk, X = keep, # = random digit
        pattern: String,
    },

    /// Generate fake data
    Fake {
        /// Generator name, one of [`FakeGenerator::ALL`]
        generator: String,
    },

    /// No redaction (passthrough)
    #[default]
    Skip,
}

impl StrategyKind {
    /// Validate the strategy configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            StrategyKind::Constant { value } => {
                if value.is_null() || value.as_str().is_some_and(str::is_empty) {
                    anyhow::bail!("Constant strategy requires a non-empty value");
                }
                Ok(())
            }
            StrategyKind::Mask { pattern } => {
                if pattern.is_empty() {
                    anyhow::bail!("Mask strategy requires a non-empty pattern");
                }
                Ok(())
            }
            StrategyKind::Fake { generator } => generator.parse::<FakeGenerator>().map(|_| ()),
            StrategyKind::Null | StrategyKind::Hash { .. } | StrategyKind::Skip => Ok(()),
        }
    }

    /// Instantiate the strategy
    pub fn build(&self) -> anyhow::Result<Box<dyn Strategy>> {
        let strategy: Box<dyn Strategy> = match self {
            StrategyKind::Null => Box::new(NullStrategy::new()),
            StrategyKind::Constant { value } => Box::new(ConstantStrategy::new(value.clone())),
            StrategyKind::Hash { preserve_domain } => Box::new(HashStrategy::new(*preserve_domain)),
            StrategyKind::Mask { pattern } => Box::new(MaskStrategy::new(pattern.clone())),
            StrategyKind::Fake { generator } => Box::new(FakeStrategy::new(generator.parse()?)),
            StrategyKind::Skip => Box::new(SkipStrategy::new()),
        };
        Ok(strategy)
    }
}

/// Trait for redaction strategies
pub trait Strategy: Send + Sync + std::fmt::Debug {
    /// Apply the strategy to redact a value
    fn apply(&self, value: &Value, rng: &mut dyn rand::RngCore) -> Value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_strategies() {
        let kinds: Vec<StrategyKind> = serde_yaml_ng::from_str(
            r#"
- strategy: hash
  preserve_domain: true
- strategy: constant
  value: 0
- strategy: mask
  pattern: "***-XXXX"
- strategy: skip
"#,
        )
        .unwrap();

        assert_eq!(
            kinds,
            vec![
                StrategyKind::Hash {
                    preserve_domain: true
                },
                StrategyKind::Constant {
                    value: Value::Integer(0)
                },
                StrategyKind::Mask {
                    pattern: "***-XXXX".to_string()
                },
                StrategyKind::Skip,
            ]
        );
    }

    #[test]
    fn test_validate() {
        assert!(StrategyKind::Fake {
            generator: "email".to_string()
        }
        .validate()
        .is_ok());
        assert!(StrategyKind::Fake {
            generator: "bogus".to_string()
        }
        .validate()
        .is_err());
        assert!(StrategyKind::Constant {
            value: Value::from("")
        }
        .validate()
        .is_err());
        assert!(StrategyKind::Mask {
            pattern: String::new()
        }
        .validate()
        .is_err());
    }

    #[test]
    fn test_build_matches_kind() {
        use rand::SeedableRng;
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let value = Value::from("secret");

        assert_eq!(StrategyKind::Skip.build().unwrap().apply(&value, &mut rng), value);
        assert_eq!(StrategyKind::Null.build().unwrap().apply(&value, &mut rng), Value::Null);
        assert!(StrategyKind::Fake {
            generator: "iban".to_string()
        }
        .build()
        .is_err());
    }
}
