//! Constant strategy - replace values with a fixed constant.

use super::Strategy;
use crate::record::Value;

/// Strategy that replaces all non-NULL values with a constant
#[derive(Debug, Clone)]
pub struct ConstantStrategy {
    value: Value,
}

impl ConstantStrategy {
    pub fn new(value: Value) -> Self {
        Self { value }
    }
}

impl Strategy for ConstantStrategy {
    fn apply(&self, value: &Value, _rng: &mut dyn rand::RngCore) -> Value {
        // NULL stays NULL
        if value.is_null() {
            Value::Null
        } else {
            self.value.clone()
        }
    }
}
