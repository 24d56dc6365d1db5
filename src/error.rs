//! Error taxonomy for the costing engine.
//!
//! Every failure surfaced by the engine is a [`CostingError`].  Each
//! variant carries a stable machine-readable code (see
//! [`CostingError::code`]) so that client tooling can branch on the
//! cause without parsing messages.

use thiserror::Error;

/// Errors returned by the pricing engine, the approval state machine and
/// the project service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostingError {
    /// A project (or another addressable entity) does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Malformed input: bad cost line, out-of-range year, blank actor.
    #[error("validation failed on `{field}`: {message}")]
    Validation { field: String, message: String },

    /// A rate table has no active row for the requested key.
    #[error("no {kind} rate for key `{key}`")]
    RateNotFound { kind: String, key: String },

    /// The approval action is not legal from the project's current status.
    #[error("cannot {action} a project in status {current_status}")]
    InvalidTransition {
        action: String,
        current_status: String,
    },

    /// The stored version moved on since the project was read.
    #[error("project {id} was modified concurrently (expected version {expected}, found {actual})")]
    OptimisticLockConflict { id: String, expected: u64, actual: u64 },
}

impl CostingError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn rate_not_found(kind: impl Into<String>, key: impl ToString) -> Self {
        Self::RateNotFound {
            kind: kind.into(),
            key: key.to_string(),
        }
    }

    pub fn project_not_found(id: impl ToString) -> Self {
        Self::NotFound {
            entity: "project",
            id: id.to_string(),
        }
    }

    /// Stable machine-readable code for this error kind.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::RateNotFound { .. } => "RATE_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::OptimisticLockConflict { .. } => "OPTIMISTIC_LOCK",
        }
    }

    /// Only lock conflicts are worth retrying: the caller re-reads the
    /// project and applies its change again.
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::OptimisticLockConflict { .. })
    }
}

pub type Result<T, E = CostingError> = std::result::Result<T, E>;
