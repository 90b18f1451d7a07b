//! Hash strategy - one-way SHA256 hash.

use super::Strategy;
use crate::record::Value;
use sha2::{Digest, Sha256};

/// Strategy that hashes values with SHA256
#[derive(Debug, Clone)]
pub struct HashStrategy {
    /// Whether to preserve email domain
    preserve_domain: bool,
}

impl HashStrategy {
    pub fn new(preserve_domain: bool) -> Self {
        Self { preserve_domain }
    }

    /// Hash a string value
    fn hash_value(&self, value: &str) -> String {
        if self.preserve_domain {
            if let Some((local, domain)) = value.rsplit_once('@') {
                let hash = compute_hash(local);
                return format!("{}@{}", &hash[..8], domain);
            }
        }

        // First 16 hex chars are plenty to stay unique within a table
        let hash = compute_hash(value);
        hash[..16].to_string()
    }
}

/// Compute SHA256 hash and return hex string
fn compute_hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

impl Strategy for HashStrategy {
    fn apply(&self, value: &Value, _rng: &mut dyn rand::RngCore) -> Value {
        match value {
            Value::Null => Value::Null,
            Value::Text(s) => Value::Text(self.hash_value(s)),
            other => Value::Text(self.hash_value(&other.to_string_value())),
        }
    }
}
