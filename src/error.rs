//! Error types for the memory core

use thiserror::Error;

/// Main error type for the memory system
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Disk I/O or (de)serialization failure while saving or loading a snapshot
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The similarity backend could not answer a query
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// A snapshot section was missing or could not be decoded
    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Embedding generation failed
    #[error("Embedding failed: {0}")]
    Embedding(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, MemoryError>;
