//! Error types for txlog
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TxLogError
pub type Result<T> = std::result::Result<T, TxLogError>;

/// Unified error type for txlog operations
#[derive(Debug, Error)]
pub enum TxLogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    /// Backend unreachable after the bounded connect retries
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(#[from] postgres::Error),

    #[error("Backend is closed")]
    BackendClosed,

    // -------------------------------------------------------------------------
    // Replay Errors
    // -------------------------------------------------------------------------
    #[error("Transaction numbers out of sequence, sequence: {sequence}, last sequence: {last}")]
    OutOfSequence { sequence: u64, last: u64 },

    #[error("Input parse error: {0}")]
    Decode(String),

    // -------------------------------------------------------------------------
    // Writer Errors
    // -------------------------------------------------------------------------
    /// An append failed in steady state; the writer has stopped consuming
    #[error("Transaction log write failed: {0}")]
    Write(String),

    #[error("Transaction log writer is not running")]
    WriterClosed,

    #[error("Transaction log queue is full")]
    QueueFull,

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("no such key")]
    KeyNotFound,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl TxLogError {
    /// Whether this error aborts startup (connection, replay, decode)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TxLogError::Connection(_)
                | TxLogError::OutOfSequence { .. }
                | TxLogError::Decode(_)
        )
    }
}
