//! Domain errors for the auto-heal engine.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors that can occur in the auto-heal engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Problem record not found: {0}")]
    ProblemNotFound(Uuid),

    #[error("Command not found: {0}")]
    CommandNotFound(Uuid),

    #[error("Action log entry not found: {0}")]
    ActionLogNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Operation '{operation}' timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Notification delivery failed: {0}")]
    NotificationFailed(String),
}

impl DomainError {
    /// Timeouts abort a whole reconciliation cycle; every other error is local to one record.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
