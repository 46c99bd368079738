use thiserror::Error;

pub type Result<T> = std::result::Result<T, EmbedError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmbedError {
    /// The embeddings circuit is open; no call was attempted
    #[error("Embedding backend unavailable, retry after {retry_after_ms}ms")]
    Unavailable { retry_after_ms: u64 },

    /// Transient backend failure, counted by the circuit breaker
    #[error("Embedding backend failure: {0}")]
    Backend(String),

    /// Misconfiguration between the backend model and the store;
    /// fatal, never retried
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}
