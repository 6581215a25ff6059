//! Error types for the sequence calculator

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the sequence calculator
///
/// None of these are fatal to a running engine: the compute path downgrades
/// every store-side variant to "no checkpoint available".
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Checkpoint Store Errors
    // =========================================================================
    /// Redis command or connection failure
    #[error("Checkpoint store error: {0}")]
    Store(#[from] redis::RedisError),

    /// Store operation exceeded its time budget
    #[error("Checkpoint store {operation} timed out after {timeout_ms}ms")]
    StoreTimeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    /// Store could not be reached (connection refused, injected fault, ...)
    #[error("Checkpoint store unavailable: {0}")]
    StoreUnavailable(String),

    /// Store was closed by the owner
    #[error("Checkpoint store is closed")]
    StoreClosed,

    /// A persisted checkpoint could not be decoded
    #[error("Corrupt checkpoint for series {key}: {raw:?}")]
    CorruptCheckpoint { key: u64, raw: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Boundary Errors
    // =========================================================================
    /// HTTP server error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Metrics registration or encoding failed
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// True for failures that a retry on a later request may not see again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Store(_) | Error::StoreTimeout { .. } | Error::StoreUnavailable(_)
        )
    }
}
