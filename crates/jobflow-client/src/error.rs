//! Error types for job client operations

use thiserror::Error;

/// Result type alias for job client operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Errors that abort a job session
///
/// Protocol violations inside an otherwise healthy exchange are reported as
/// [`jobflow_core::Outcome::Failed`] values instead.
#[derive(Error, Debug)]
pub enum JobError {
    /// HTTP request failed (connection, timeout, body read)
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Server returned a non-2xx response
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Credentials are missing or were rejected; the caller should re-authenticate
    #[error("Session expired, please log in again")]
    SessionExpired,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl JobError {
    /// Create a server error from status code and message
    pub fn server_error(status: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            message: message.into(),
        }
    }

    /// Whether the caller should redirect to re-authentication
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// Whether the error came from the transport layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_) | Self::ServerError { .. } | Self::ParseError(_)
        )
    }
}

impl From<jobflow_core::CoreError> for JobError {
    fn from(err: jobflow_core::CoreError) -> Self {
        Self::ParseError(err.to_string())
    }
}
