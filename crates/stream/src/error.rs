use thiserror::Error;

/// Terminal stream failures, delivered as [`crate::StreamEvent::Error`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    /// The completion circuit is open; no backend call was attempted
    #[error("Completion backend temporarily unavailable, retry after {retry_after_ms}ms")]
    BackendUnavailable { retry_after_ms: u64 },

    /// No token arrived within the configured idle timeout
    #[error("Stream timed out waiting for the next token")]
    Timeout,

    /// The backend failed mid-stream
    #[error("Completion backend failure: {0}")]
    Backend(String),
}
