//! Storage error type.

use thiserror::Error;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A present ledger field has the wrong type. Fatal: the ledger was
    /// written by an incompatible configuration.
    #[error("Ledger line {line}: key '{key}' must have type '{expected}' instead of '{found}'")]
    LedgerField {
        line: usize,
        key: String,
        expected: &'static str,
        found: String,
    },

    /// A ledger line other than the last one is not a valid record.
    #[error("Ledger line {line} is corrupt: {reason}")]
    LedgerCorrupt { line: usize, reason: String },
}

impl StorageError {
    /// Ledger consistency errors abort the run; I/O errors may be transient.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::LedgerField { .. } | StorageError::LedgerCorrupt { .. }
        )
    }
}
