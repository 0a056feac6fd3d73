//! Error types for STRATA

use thiserror::Error;

/// Result type for STRATA operations
pub type StrataResult<T> = Result<T, StrataError>;

/// Main error type for STRATA
#[derive(Error, Debug)]
pub enum StrataError {
    // ============ Storage Errors ============
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Missing metadata entry: {0}")]
    MissingMetadata(String),

    #[error("State corruption detected: {0}")]
    StateCorruption(String),

    // ============ Genesis Errors ============
    #[error("Invalid genesis: {0}")]
    InvalidGenesis(String),

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    // ============ Lifecycle Errors ============
    #[error("State already initialized")]
    AlreadyInitialized,

    #[error("State not initialized")]
    NotInitialized,

    #[error("State unusable after failed {0}")]
    Unusable(&'static str),

    #[error("State closed")]
    Closed,

    // ============ Metrics Errors ============
    #[error("Metrics registration failed: {0}")]
    MetricsError(String),

    // ============ Serialization Errors ============
    #[error("Serialization failed: {0}")]
    SerializationError(String),

    #[error("Deserialization failed: {0}")]
    DeserializationError(String),

    // ============ Configuration Errors ============
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ============ General Errors ============
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for StrataError {
    fn from(err: std::io::Error) -> Self {
        StrataError::StorageError(err.to_string())
    }
}

impl From<bincode::Error> for StrataError {
    fn from(err: bincode::Error) -> Self {
        StrataError::SerializationError(err.to_string())
    }
}

impl From<serde_json::Error> for StrataError {
    fn from(err: serde_json::Error) -> Self {
        StrataError::SerializationError(err.to_string())
    }
}
