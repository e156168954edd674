//! Error types for the gateway

use std::path::PathBuf;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Serial device could not be opened or cloned
    #[error("Serial transport unavailable ({path}): {source}")]
    TransportUnavailable {
        path: String,
        #[source]
        source: serialport::Error,
    },

    /// I/O error on the serial line or a socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Datagram is not utf-8 json object
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Well-formed request that names no known command or action
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// String outside the fixed set of mode tokens
    #[error("Invalid mode token: {0:?}")]
    InvalidModeToken(String),

    /// Record log could not be written
    #[error("Record log {path} unwritable: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Record log could not be encoded
    #[error("Record log encoding failed: {0}")]
    Encode(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
