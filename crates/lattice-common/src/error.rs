//! Error types for Lattice.

use thiserror::Error;

/// Result type alias using LatticeError.
pub type Result<T> = std::result::Result<T, LatticeError>;

/// Errors that can occur in Lattice operations.
#[derive(Debug, Error)]
pub enum LatticeError {
    // Key admission errors
    #[error("Duplicate key")]
    DuplicateKey,

    #[error("Null value not allowed")]
    NullNotAllowed,

    #[error("Key arity mismatch: expected {expected} columns, got {actual}")]
    KeyArity { expected: usize, actual: usize },

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    // Lookup errors
    #[error("Key not found")]
    KeyNotFound,

    #[error("Ambiguous update: key holds {rows} rows")]
    AmbiguousUpdate { rows: u64 },

    // Surrogate key errors
    #[error("Key space exhausted: {0}")]
    KeyExhausted(String),

    #[error("Unsupported type: {0}")]
    UnsupportedType(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
