//! Error types for the classification engine
//!
//! Errors are classified by recoverability:
//! - Retryable: transient persistence/network failures (caller may retry;
//!   the engine itself never does)
//! - NonRetryable: validation and permission failures
//! - RequiresAdmin: a required canonical label is missing and the actor
//!   cannot create it

use thiserror::Error;

use crate::db::DbError;

/// Error surface of the classification & prioritization engine.
#[derive(Debug, Error)]
pub enum EngineError {
    // Non-retryable errors
    #[error("Invalid target: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Uniqueness race during canonical-label creation. Recovered internally
    /// by re-reading the winning row; never surfaced to callers.
    #[error("Conflict: {0}")]
    Conflict(String),

    // Retryable errors
    #[error("Persistence failed: {0}")]
    TransientNetwork(String),

    // Requires admin action
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Returns true if this error is retryable by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransientNetwork(_))
    }

    /// Returns true if resolving this error needs a workspace administrator.
    pub fn requires_admin(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }

    /// Get a user-friendly recovery suggestion.
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "Check the requested phase or temperature value.",
            EngineError::PermissionDenied(_) => {
                "You don't have access to this conversation. Ask the assigned operator."
            }
            EngineError::Conflict(_) => "Another writer got there first. Re-read and retry.",
            EngineError::TransientNetwork(_) => {
                "The change was not saved. Check your connection and try again."
            }
            EngineError::Configuration(_) => {
                "Ask an administrator to set up the funnel labels for this workspace."
            }
        }
    }
}

impl From<DbError> for EngineError {
    /// Every storage failure surfaces as a transient persistence error; the
    /// transition engine rolls back its projection before propagating it.
    fn from(err: DbError) -> Self {
        EngineError::TransientNetwork(err.to_string())
    }
}

/// Serializable error representation for collaborator UIs.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SurfacedError {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Retryable,
    NonRetryable,
    RequiresAdmin,
}

impl From<&EngineError> for SurfacedError {
    fn from(err: &EngineError) -> Self {
        let error_type = if err.requires_admin() {
            ErrorType::RequiresAdmin
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::NonRetryable
        };

        SurfacedError {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        let err = EngineError::TransientNetwork("db locked".into());
        assert!(err.is_retryable());
        assert!(!err.requires_admin());
    }

    #[test]
    fn test_configuration_requires_admin() {
        let err = EngineError::Configuration("missing canonical label".into());
        let surfaced = SurfacedError::from(&err);
        assert!(matches!(surfaced.error_type, ErrorType::RequiresAdmin));
        assert!(!surfaced.can_retry);
    }
}
