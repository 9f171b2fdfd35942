//! Error types for the recommendation core
//!
//! Errors are classified by how the caller should react:
//! - Validation: malformed input rejected at the boundary
//! - Computation: a ranking attempt failed numerically, no recommendation for that concept
//! - ConcurrencyConflict: lost-update detection on arm state, retryable

use thiserror::Error;

use crate::db::DbError;

/// Error types for recommendation, mastery and bandit operations
#[derive(Debug, Error)]
pub enum EngineError {
    // Rejected at the boundary
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Fatal to a single ranking attempt only
    #[error("Computation error: {0}")]
    Computation(String),

    // Retryable
    #[error("Concurrent update conflict on arm {action_id} after {attempts} attempts")]
    ConcurrencyConflict { action_id: i64, attempts: u32 },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Returns true if the caller may retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::ConcurrencyConflict { .. })
    }

    /// Returns true if this error means "no recommendation available" rather
    /// than a failure of the whole request.
    pub fn is_computation(&self) -> bool {
        matches!(self, EngineError::Computation(_))
    }

    /// Short machine-readable tag for collaborators.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::NotFound(_) => "not_found",
            EngineError::Configuration(_) => "configuration",
            EngineError::Computation(_) => "computation",
            EngineError::ConcurrencyConflict { .. } => "concurrency_conflict",
            EngineError::Db(_) => "storage",
            EngineError::Serialization(_) => "serialization",
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Db(DbError::Sqlite(err))
    }
}

/// Serializable error representation handed back across the collaborator boundary
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl From<&EngineError> for ErrorReport {
    fn from(err: &EngineError) -> Self {
        ErrorReport {
            kind: err.kind(),
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_conflicts_are_retryable() {
        let conflict = EngineError::ConcurrencyConflict { action_id: 7, attempts: 3 };
        assert!(conflict.is_retryable());
        assert!(!EngineError::Validation("bad".into()).is_retryable());
        assert!(!EngineError::Computation("singular".into()).is_retryable());
    }

    #[test]
    fn test_error_report_carries_kind() {
        let err = EngineError::Computation("pivot 0 at row 1".into());
        let report = ErrorReport::from(&err);
        assert_eq!(report.kind, "computation");
        assert!(!report.retryable);
        assert!(report.message.contains("pivot"));
    }
}
