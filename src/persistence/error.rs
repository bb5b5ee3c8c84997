use thiserror::Error;

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Persistence failures. All of them are non-fatal: the engine degrades to
/// best-effort and keeps running without saved data.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage backend error: {0}")]
    Storage(String),

    #[error("corrupted record: {0}")]
    CorruptedData(String),

    #[error("record version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("persistence worker is gone")]
    WorkerGone,
}
