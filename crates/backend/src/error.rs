use thiserror::Error;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors produced by an AI backend.
///
/// `Transient` covers everything the caller may retry and the circuit
/// breaker counts: transport failures, timeouts, non-2xx statuses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Invalid endpoint (empty or missing http/https)
    #[error("Invalid backend endpoint: {0}")]
    InvalidEndpoint(String),

    /// Transport error or non-successful HTTP status
    #[error("Backend transient failure: {0}")]
    Transient(String),

    /// Unexpected/invalid response body
    #[error("Failed to decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Create a transient error
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }
}
