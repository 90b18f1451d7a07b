//! Skip strategy - no redaction, passthrough.

use super::Strategy;
use crate::record::Value;

/// Strategy that passes values through unchanged
#[derive(Debug, Clone, Default)]
pub struct SkipStrategy;

impl SkipStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for SkipStrategy {
    fn apply(&self, value: &Value, _rng: &mut dyn rand::RngCore) -> Value {
        value.clone()
    }
}
