//! Error types for BurrowKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BurrowError
pub type Result<T> = std::result::Result<T, BurrowError>;

/// Unified error type for BurrowKV operations
#[derive(Debug, Error)]
pub enum BurrowError {
    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Store is not open")]
    NotOpen,

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    /// A mutation could not be durably committed. The in-memory index is
    /// untouched and the segment has been rolled back to its previous length.
    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Corrupt record: {0}")]
    CorruptRecord(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    // -------------------------------------------------------------------------
    // Operation Errors
    // -------------------------------------------------------------------------
    #[error("Invalid merge: {0}")]
    InvalidMerge(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BurrowError {
    /// Wrap an I/O failure on the write path
    pub(crate) fn write_failed(context: &str, err: std::io::Error) -> Self {
        BurrowError::WriteFailed(format!("{}: {}", context, err))
    }
}
