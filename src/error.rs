//! Error types for the payroll engine.
//!
//! Pure calculations never fail: malformed inputs degrade to zero
//! results.  Errors only come from lifecycle guards, the persistence
//! boundary and (in strict mode) country resolution.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The kind of entity an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Contract,
    Timesheet,
    Payslip,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Contract => "contract",
            EntityKind::Timesheet => "timesheet",
            EntityKind::Payslip => "payslip",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("{entity} {id} is {status}: cannot {operation}")]
    InvalidTransition {
        entity: EntityKind,
        id: String,
        status: String,
        operation: String,
    },
    #[error("{entity} {id} is {status} and can no longer be modified")]
    NotEditable {
        entity: EntityKind,
        id: String,
        status: String,
    },
    #[error("role {role} is not allowed to {operation} a {entity}")]
    Forbidden {
        entity: EntityKind,
        role: String,
        operation: String,
    },
    #[error("{entity} {id}: {reason}")]
    Precondition {
        entity: EntityKind,
        id: String,
        reason: String,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },
    #[error("{entity} {id} already exists")]
    Duplicate { entity: EntityKind, id: String },
    #[error("could not allocate a unique number for {prefix} after {attempts} attempts")]
    SequenceExhausted { prefix: String, attempts: u32 },
    #[error("unknown country code {0:?}")]
    UnknownCountry(String),
    #[error("invalid configuration for country {code}: {reason}")]
    InvalidConfig { code: String, reason: String },
}

impl EngineError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::SequenceExhausted { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message_names_entity_and_status() {
        let err = EngineError::InvalidTransition {
            entity: EntityKind::Contract,
            id: "c-1".into(),
            status: "SIGNED".into(),
            operation: "edit".into(),
        };
        assert_eq!(err.to_string(), "contract c-1 is SIGNED: cannot edit");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_errors() {
        let err = EngineError::SequenceExhausted {
            prefix: "GA-BULLETIN-202506".into(),
            attempts: 5,
        };
        assert!(err.is_retryable());
        assert!(!EngineError::UnknownCountry("XX".into()).is_retryable());
    }
}
