// docbase-core/src/error.rs

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the storage and query engine
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document or query payload cannot be turned into the expected structure
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("index on field '{field}' already exists in collection '{collection}'")]
    IndexAlreadyExists { collection: String, field: String },

    #[error("no index on field '{field}' in collection '{collection}'")]
    IndexMissing { collection: String, field: String },

    #[error("validation failed: {0}")]
    Validation(String),

    /// Persisted index data that does not verify against its checksum/header
    #[error("corrupted data: {0}")]
    Corruption(String),

    #[error("collection manager has been stopped")]
    ManagerStopped,
}

impl StoreError {
    /// True for failures of the persistence layer (disk I/O or encoding).
    ///
    /// A write that fails with one of these may already have changed the
    /// in-memory state.
    pub fn is_persistence(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Serialization(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
