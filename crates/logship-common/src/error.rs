//! Error types for logship

use thiserror::Error;

/// Result type alias for logship operations
pub type Result<T> = std::result::Result<T, LogshipError>;

/// Main error type for logship
#[derive(Error, Debug)]
pub enum LogshipError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key {key:?} does not start with prefix {prefix:?}")]
    KeyOutsidePrefix { key: String, prefix: String },

    #[error("Timestamp error: {0}")]
    Timestamp(String),
}
