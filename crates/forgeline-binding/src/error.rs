//! Error types for binding operations.

use thiserror::Error;

/// Result type alias for binding operations.
pub type BindingResult<T> = Result<T, BindingError>;

/// Errors surfaced by the binding registry.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown factory, blueprint, or version.
    #[error("not found: {0}")]
    NotFound(String),

    /// Binding already exists or the target version is not applicable.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage-level failure.
    #[error(transparent)]
    State(#[from] forgeline_state::StateError),
}
