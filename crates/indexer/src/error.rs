use thiserror::Error;

pub type Result<T> = std::result::Result<T, IndexerError>;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Store error: {0}")]
    Store(#[from] relay_vector_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
