//! Error types for cadence-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use cadence_common::MediaRef;
use thiserror::Error;

/// Main error type for cadence-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored JSON could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Neither the local download nor any quality candidate produced a source
    #[error("No playable source for {0}")]
    ResolutionExhausted(MediaRef),

    /// No plugin registered for a platform
    #[error("No plugin for platform: {0}")]
    UnknownPlatform(String),

    /// Inbound transport command rejected
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Invalid request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<cadence_common::Error> for Error {
    fn from(e: cadence_common::Error) -> Self {
        match e {
            cadence_common::Error::InvalidCommand(msg) => Error::InvalidCommand(msg),
            cadence_common::Error::InvalidInput(msg) => Error::BadRequest(msg),
            cadence_common::Error::Config(msg) => Error::Config(msg),
            cadence_common::Error::Io(e) => Error::Io(e),
            cadence_common::Error::Internal(msg) => Error::Internal(msg),
        }
    }
}

/// Convenience Result type using cadence-player Error
pub type Result<T> = std::result::Result<T, Error>;
