//! Error taxonomy shared by the table engine and the database adapters.
//!
//! Operations return `anyhow::Result` so adapter failures carry context about
//! the table, filter and batch they happened in. The typed errors below sit at
//! the root of those chains and can be recovered with
//! `err.downcast_ref::<ShrinkError>()`.

use crate::pk::PkValue;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShrinkError {
    /// An adapter rejected a batch transition.
    #[error("contract violation on table '{table}': {kind}")]
    ContractViolation { table: String, kind: ViolationKind },

    /// Invalid options detected while registering tables, filters or rules.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A record lacks its primary key, or the key is not an integer or text.
    #[error("record in table '{table}' has no usable primary key in column '{column}'")]
    MissingPrimaryKey { table: String, column: String },

    /// The adapter does not know the table.
    #[error("unknown table '{0}'")]
    UnknownTable(String),
}

impl ShrinkError {
    pub fn config(message: impl Into<String>) -> Self {
        ShrinkError::Configuration(message.into())
    }

    pub fn violation(table: &str, kind: ViolationKind) -> Self {
        ShrinkError::ContractViolation {
            table: table.to_string(),
            kind,
        }
    }

    /// Returns the violation kind if this is a contract violation.
    pub fn violation_kind(&self) -> Option<&ViolationKind> {
        match self {
            ShrinkError::ContractViolation { kind, .. } => Some(kind),
            _ => None,
        }
    }
}

/// Ways an old/new record pair can break the update contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationKind {
    /// Old and new sets differ in size.
    CardinalityChanged { old: usize, new: usize },
    /// A key present in the old set is missing from the new set.
    RecordRemoved { key: PkValue },
    /// A record came back with a different primary key.
    PrimaryKeyChanged { old: PkValue, new: PkValue },
    /// The same key appears twice in one set.
    DuplicatePrimaryKey { key: PkValue },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::CardinalityChanged { old, new } => write!(
                f,
                "update changed record count from {} to {}; removals must use delete_records",
                old, new
            ),
            ViolationKind::RecordRemoved { key } => write!(
                f,
                "record {} missing from new set; removals must use delete_records",
                key
            ),
            ViolationKind::PrimaryKeyChanged { old, new } => {
                write!(f, "primary key changed from {} to {}", old, new)
            }
            ViolationKind::DuplicatePrimaryKey { key } => {
                write!(f, "primary key {} appears more than once", key)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_message_names_table() {
        let err = ShrinkError::violation(
            "users",
            ViolationKind::PrimaryKeyChanged {
                old: PkValue::Int(1),
                new: PkValue::Int(10),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("users"));
        assert!(msg.contains("from 1 to 10"));
        assert!(err.violation_kind().is_some());
    }

    #[test]
    fn test_configuration_has_no_violation_kind() {
        let err = ShrinkError::config("bad batch size");
        assert!(err.violation_kind().is_none());
        assert_eq!(err.to_string(), "configuration error: bad batch size");
    }
}
