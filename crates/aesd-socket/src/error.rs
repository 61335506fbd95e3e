//! Error types for the socket server

use thiserror::Error;

use aesd_core::AesdError;

/// Errors that can occur while configuring or running the server
#[derive(Debug, Error)]
pub enum ServerError {
    /// Command log error (framing, seek bounds, lock)
    #[error("Log error: {0}")]
    Core(#[from] AesdError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener could not be bound
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for ServerError {
    fn from(e: toml::de::Error) -> Self {
        ServerError::Config(e.to_string())
    }
}

/// Result type alias for server operations
pub type ServerResult<T> = Result<T, ServerError>;
