//! Common error types for the pure job layer

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while interpreting backend payloads
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// A response did not match any of the known shapes
    #[error("Unrecognized response shape: {0}")]
    UnrecognizedShape(String),

    /// A required field was absent or empty
    #[error("Missing field: {0}")]
    MissingField(&'static str),
}
