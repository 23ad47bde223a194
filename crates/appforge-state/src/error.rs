//! Error types for appforge-state

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem failure while reading or persisting a dataset
    #[error("I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A previous writer panicked while holding the dataset lock
    #[error("Store lock poisoned: {0}")]
    LockPoisoned(&'static str),

    /// Record rejected before it reached disk
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<tempfile::PersistError> for StoreError {
    fn from(err: tempfile::PersistError) -> Self {
        StoreError::Io(err.error)
    }
}
