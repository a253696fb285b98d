//! Error types for convolog-core

use thiserror::Error;

/// Main error type for the convolog-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File path does not match the expected log directory shape
    #[error("invalid log file path: {path}")]
    InvalidPath { path: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for convolog-core
pub type Result<T> = std::result::Result<T, Error>;
