//! Error types for meshdisco

use thiserror::Error;

/// Main error type for meshdisco operations
#[derive(Error, Debug)]
pub enum Error {
    /// Identity key loading, parsing, or generation errors
    #[error("Identity error: {0}")]
    Identity(String),

    /// Trust store errors
    #[error("Trust store error: {0}")]
    Trust(String),

    /// Malformed or unresolvable endpoint strings
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    Endpoint {
        /// The offending endpoint string
        endpoint: String,
        /// Why it was rejected
        reason: String,
    },

    /// Wire protocol framing or serialization errors
    #[error("Wire protocol error: {0}")]
    Wire(String),

    /// TLS configuration or handshake errors
    #[error("TLS error: {0}")]
    Tls(String),

    /// A peer request did not complete within the per-call timeout
    #[error("Request to '{endpoint}' timed out")]
    Timeout {
        /// Endpoint of the unresponsive peer
        endpoint: String,
    },

    /// Connection establishment failures
    #[error("Connection to '{endpoint}' failed: {reason}")]
    ConnectionFailed {
        /// Endpoint that could not be reached
        endpoint: String,
        /// Why the connection failed
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The actor has terminated and no longer accepts commands
    #[error("Directory actor has terminated")]
    Terminated,

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
