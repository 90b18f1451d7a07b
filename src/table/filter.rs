//! Filters and sanitizers registered on a table.

use super::callback::{Predicate, Transform};
use crate::record::Record;
use std::fmt;

/// Options for a registered filter
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    /// Label used in logs and error context
    pub name: Option<String>,
}

impl FilterOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// A named predicate deciding whether a record survives the table
pub struct Filter {
    options: FilterOptions,
    predicate: Box<dyn Predicate>,
}

impl Filter {
    pub fn new(options: FilterOptions, predicate: impl Predicate + 'static) -> Self {
        Self {
            options,
            predicate: Box::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        self.options.name.as_deref().unwrap_or("filter")
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// True if the record should be kept
    pub fn apply(&self, record: &Record) -> bool {
        self.predicate.test(record)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Options for a registered sanitizer
#[derive(Debug, Clone, Default)]
pub struct SanitizerOptions {
    /// Label used in logs and error context
    pub name: Option<String>,
}

impl SanitizerOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// A named transform rewriting a record without changing its existence
pub struct Sanitizer {
    options: SanitizerOptions,
    transform: Box<dyn Transform>,
}

impl Sanitizer {
    pub fn new(options: SanitizerOptions, transform: impl Transform + 'static) -> Self {
        Self {
            options,
            transform: Box::new(transform),
        }
    }

    pub fn name(&self) -> &str {
        self.options.name.as_deref().unwrap_or("sanitizer")
    }

    pub fn options(&self) -> &SanitizerOptions {
        &self.options
    }

    pub fn apply(&self, record: Record) -> Record {
        self.transform.apply(record)
    }
}

impl fmt::Debug for Sanitizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sanitizer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Condition;

    #[test]
    fn test_filter_with_closure_and_condition() {
        let by_closure = Filter::new(FilterOptions::default(), |r: &Record| {
            r.get("test").and_then(|v| v.as_i64()).is_some_and(|t| t > 5)
        });
        let by_condition = Filter::new(
            FilterOptions::named("big"),
            Condition::compare("test", crate::condition::CompareOp::Gt, 5),
        );

        let small = Record::new().with("test", 3);
        let big = Record::new().with("test", 9);

        assert!(!by_closure.apply(&small));
        assert!(by_closure.apply(&big));
        assert!(!by_condition.apply(&small));
        assert!(by_condition.apply(&big));

        assert_eq!(by_closure.name(), "filter");
        assert_eq!(by_condition.name(), "big");
    }

    #[test]
    fn test_sanitizer_gets_owned_copy() {
        let sanitizer = Sanitizer::new(SanitizerOptions::named("upper"), |mut r: Record| {
            r.set("name", "REDACTED");
            r
        });

        let original = Record::new().with("id", 1).with("name", "alice");
        let rewritten = sanitizer.apply(original.clone());

        assert_eq!(original.get("name").and_then(|v| v.as_str()), Some("alice"));
        assert_eq!(rewritten.get("name").and_then(|v| v.as_str()), Some("REDACTED"));
        assert_eq!(sanitizer.name(), "upper");
    }
}
