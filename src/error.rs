//! Error types for the teardown pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the capture-and-render pipeline
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to launch or attach to an engine session
    #[error("Engine session failed: {0}")]
    Session(String),

    /// Navigation failed after both readiness-signal attempts
    #[error("Navigation failed: {0}")]
    Navigation(String),

    /// Failed to produce a capture from a stabilized page
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Failed to render the composed document into an artifact
    #[error("Rendering failed: {0}")]
    Render(String),

    /// Operation timed out
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Critique collaborator failure, passed through unchanged
    #[error("Critique service error: {0}")]
    Critique(String),

    /// Storage collaborator failure, passed through unchanged
    #[error("Storage error: {0}")]
    Storage(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
