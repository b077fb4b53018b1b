//! Error types for the voice-notes cache

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache subsystem
///
/// None of these are fatal to the application: every failure degrades to
/// "item not cached".
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    // =========================================================================
    // Budget Errors
    // =========================================================================
    /// Payload cannot fit even in an empty cache
    #[error("Payload of {size} bytes exceeds the cache budget of {budget} bytes")]
    OversizedPayload { size: u64, budget: u64 },

    /// Payload exceeds the per-entry limit of its policy
    #[error("Entry of {size} bytes exceeds the policy limit of {limit} bytes")]
    EntryTooLarge { size: u64, limit: u64 },

    // =========================================================================
    // Encoding Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    /// Byte stream is not a valid cache frame
    #[error("Invalid cache frame: {0}")]
    InvalidFormat(String),

    /// Stored payload no longer matches its content hash
    #[error("Integrity check failed for {0}")]
    IntegrityCheckFailed(String),

    // =========================================================================
    // Operation Errors
    // =========================================================================
    /// Invalidation pattern could not be compiled
    #[error("Invalid invalidation pattern: {0}")]
    InvalidPattern(String),

    /// Size bookkeeping went out of sync with the store
    #[error("Size accounting mismatch: {0}")]
    Accounting(String),

    /// No preload source was configured on the manager
    #[error("No preload source configured")]
    NoPreloadSource,

    /// The preload source failed for a key
    #[error("Preload failed for {key}: {reason}")]
    PreloadFailed { key: String, reason: String },

    /// An operation did not finish in time
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::InvalidPattern(e.to_string())
    }
}
