//! Error types for routing table compression.
//!
//! This module provides a unified error type for every fallible operation in
//! the crate, using the `thiserror` crate for ergonomic error handling.
//!
//! Allocation failures and corrupt state are propagated immediately through
//! every call frame. Cancellation and time-outs are only raised at the
//! polling points of the ordered-covering loop and the orchestrator phases.

use std::collections::TryReserveError;
use thiserror::Error;

/// The main error type for compression operations.
#[derive(Error, Debug)]
pub enum CompressorError {
    /// A memory pool lease or a buffer allocation could not be satisfied
    #[error("Out of memory: requested {requested} bytes, {available} available")]
    OutOfMemory {
        /// Bytes requested
        requested: usize,
        /// Bytes still available in the pool at the time of the request
        available: usize,
    },

    /// An internal invariant was violated; not recoverable
    #[error("Corrupt state: {0}")]
    CorruptState(String),

    /// Cooperative cancellation was observed
    #[error("Compression aborted")]
    Aborted,

    /// The time budget was exceeded
    #[error("Compression time budget exceeded")]
    TimedOut,

    /// The router does not have room for the table
    #[error("Table of {needed} entries exceeds router capacity of {available}")]
    CapacityExceeded {
        /// Entries in the table being loaded
        needed: usize,
        /// Entries available in the router
        available: usize,
    },

    /// Malformed input buffer or configuration
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary serialization error occurred
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// JSON serialization error occurred
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl From<TryReserveError> for CompressorError {
    fn from(_: TryReserveError) -> Self {
        CompressorError::OutOfMemory {
            requested: 0,
            available: 0,
        }
    }
}

/// A specialized `Result` type for compression operations.
pub type Result<T> = std::result::Result<T, CompressorError>;
