//! Error types for version history operations.

use thiserror::Error;

/// Result type alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// Errors surfaced by the version store and comparator.
#[derive(Debug, Error)]
pub enum VersionError {
    /// Input rejected before touching state (e.g. empty release notes).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown blueprint or version.
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation contradicts current lifecycle state
    /// (re-publish, second open draft, editing a published version).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Storage-level failure.
    #[error(transparent)]
    State(#[from] forgeline_state::StateError),
}
