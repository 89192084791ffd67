//! Error types for the record store.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Change notifier error: {0}")]
    Watcher(#[from] notify::Error),

    #[error("Unknown format: {0}, expecting json|xml")]
    UnknownFormat(String),

    #[error("Type mismatch: cannot add {got} to records of {expected}")]
    TypeMismatch { expected: String, got: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Cannot {operation} {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode {}: {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Generator returned duplicate id {0}")]
    DuplicateId(String),

    #[error("Generator has no ids left after {0}")]
    GeneratorExhausted(String),

    #[error("Not implemented: {0}")]
    Unimplemented(&'static str),

    #[error("Store is closed")]
    Closed,

    #[error("Cannot watch {} or any of its ancestors: {source}", .path.display())]
    Unwatchable {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

impl StoreError {
    /// True for errors caused by how the store was configured or called
    /// (unknown format, payload of the wrong kind).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StoreError::UnknownFormat(_)
                | StoreError::TypeMismatch { .. }
                | StoreError::Serialization(_)
        )
    }

    /// True for failures reading or writing the backing file.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            StoreError::Persistence { .. } | StoreError::Decode { .. } | StoreError::Corruption(_)
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
