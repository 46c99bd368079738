use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Unreadable persisted state; operator intervention required
    #[error("Store corruption: {0}")]
    Corrupt(String),

    /// A previous persistence failure halted writes to this store
    #[error("Store writes halted after a persistence failure; reopen to resume")]
    WritesHalted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
