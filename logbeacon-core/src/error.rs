//! Error types for logbeacon-core

use thiserror::Error;

/// Main error type for the logbeacon-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistent key-value storage error
    #[error("storage error: {0}")]
    Storage(String),

    /// Host platform query error
    #[error("platform error: {0}")]
    Platform(String),

    /// Network or endpoint error while uploading a batch
    #[error("transport error: {0}")]
    Transport(String),

    /// Event could not be built from the caller's payload
    #[error("build error: {0}")]
    Build(String),
}

/// Result type alias for logbeacon-core
pub type Result<T> = std::result::Result<T, Error>;
