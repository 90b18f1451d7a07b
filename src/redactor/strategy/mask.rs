//! Mask strategy - partial masking with pattern.

use super::Strategy;
use crate::record::Value;
use rand::Rng;

/// Strategy that partially masks values using a pattern.
///
/// Pattern syntax:
/// - `*` = replace with asterisk
/// - `X` = keep original character
/// - `#` = replace with random digit
/// - Any other character = literal (e.g., `-`, `.`, `@`)
#[derive(Debug, Clone)]
pub struct MaskStrategy {
    pattern: String,
}

impl MaskStrategy {
    pub fn new(pattern: String) -> Self {
        Self { pattern }
    }

    /// Apply the mask pattern to a value
    fn mask_value(&self, value: &str, rng: &mut dyn rand::RngCore) -> String {
        let chars: Vec<char> = value.chars().collect();
        let mut result = String::with_capacity(self.pattern.len());

        let mut value_idx = 0;

        for pattern_char in self.pattern.chars() {
            match pattern_char {
                '*' => {
                    result.push('*');
                    value_idx += 1;
                }
                'X' => {
                    if let Some(c) = chars.get(value_idx) {
                        result.push(*c);
                    }
                    value_idx += 1;
                }
                '#' => {
                    let digit: u32 = rng.random_range(0..10);
                    result.push(char::from_digit(digit, 10).unwrap_or('0'));
                    value_idx += 1;
                }
                c => {
                    result.push(c);
                    // Separators only consume input when the original has them too
                    if chars.get(value_idx) == Some(&c) {
                        value_idx += 1;
                    }
                }
            }
        }

        result
    }
}

impl Strategy for MaskStrategy {
    fn apply(&self, value: &Value, rng: &mut dyn rand::RngCore) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::Text(s) => Value::Text(self.mask_value(s, rng)),
            other => Value::Text(self.mask_value(&other.to_string_value(), rng)),
        }
    }
}
