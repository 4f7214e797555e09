//! Store errors.

use thiserror::Error;

/// Errors that can occur during storage operations.
///
/// Storage failures are fatal for a calibration run: they are never retried
/// and propagate to the caller unchanged.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Array could not be encoded as `.npy`
    #[error("Failed to write npy array: {0}")]
    NpyWrite(#[from] ndarray_npy::WriteNpyError),

    /// Array could not be decoded from `.npy`
    #[error("Failed to read npy array: {0}")]
    NpyRead(#[from] ndarray_npy::ReadNpyError),

    /// CSV encoding or decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Key cannot be mapped to a storage location
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Create an invalid key error.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is an invalid key error.
    pub fn is_invalid_key(&self) -> bool {
        matches!(self, Self::InvalidKey(_))
    }
}
