//! Error types for rollout and rollback operations.
//!
//! Only single-entity operations (rollback) surface these directly.
//! Batch upgrades never propagate a per-factory error as a batch-level
//! failure; each factory gets an explicit result entry instead.

use thiserror::Error;

use forgeline_binding::BindingError;

/// Result type alias for rollout operations.
pub type RolloutResult<T> = Result<T, RolloutError>;

/// Errors surfaced by single-entity rollout operations.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage-level failure.
    #[error(transparent)]
    State(#[from] forgeline_state::StateError),
}

impl From<BindingError> for RolloutError {
    fn from(err: BindingError) -> Self {
        match err {
            BindingError::Validation(msg) => Self::Validation(msg),
            BindingError::NotFound(msg) => Self::NotFound(msg),
            BindingError::Conflict(msg) => Self::Conflict(msg),
            BindingError::State(e) => Self::State(e),
        }
    }
}
