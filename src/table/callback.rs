//! Capability traits for caller-supplied row logic.

use crate::condition::Condition;
use crate::record::Record;

/// A predicate over a single record.
///
/// Filters keep a record when this returns true; locks protect it.
/// The record is borrowed immutably, so a predicate cannot rewrite the batch
/// it is deciding on.
pub trait Predicate {
    fn test(&self, record: &Record) -> bool;
}

impl<F> Predicate for F
where
    F: Fn(&Record) -> bool,
{
    fn test(&self, record: &Record) -> bool {
        self(record)
    }
}

impl Predicate for Condition {
    fn test(&self, record: &Record) -> bool {
        self.matches(record)
    }
}

/// A rewrite of a single record.
///
/// Receives an owned copy; the original stays in the batch as the "old" side
/// of the update.
pub trait Transform {
    fn apply(&self, record: Record) -> Record;
}

impl<F> Transform for F
where
    F: Fn(Record) -> Record,
{
    fn apply(&self, record: Record) -> Record {
        self(record)
    }
}
