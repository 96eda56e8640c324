use thiserror::Error;

/// Crate-wide result alias.
pub type AppResult<T> = Result<T, AppError>;

/// Failure modes surfaced by the object store, distinguished by whether a
/// retry is ever worth attempting.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("chunk {0} not found in object store")]
    NotFound(u64),

    #[error("transient object store failure: {0}")]
    Transient(String),

    #[error("permanent object store failure: {0}")]
    Permanent(String),
}

/// The library's single public error type.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid pointer: {0}")]
    InvalidPointer(String),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("invalid vector: {0}")]
    InvalidVector(String),

    #[error("chunk {0} is corrupt: {1}")]
    ChunkCorrupt(u64, String),

    #[error("object store error: {0}")]
    Store(#[from] StoreError),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("index error: {0}")]
    Index(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}
