//! Reading store error types
//!
//! Defines all errors that can occur in the storage layer.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the reading store
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite returned an error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database file could not be opened
    #[error("Failed to open reading store at {path:?}: {error}")]
    Open { path: PathBuf, error: String },

    /// Invalid time range (start >= end)
    #[error("Invalid time range: start must be less than end")]
    InvalidTimeRange,
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::InvalidTimeRange;
        assert_eq!(
            err.to_string(),
            "Invalid time range: start must be less than end"
        );

        let err = StorageError::Open {
            path: PathBuf::from("/nope/cgm.db"),
            error: "unable to open database file".to_string(),
        };
        assert!(err.to_string().contains("/nope/cgm.db"));
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let sqlite_err = rusqlite::Error::InvalidQuery;
        let storage_err: StorageError = sqlite_err.into();
        assert!(matches!(storage_err, StorageError::Database(_)));
    }
}
