/*!
Common error types for the Motion SDK client.

Timeouts are never reported through this type. A blocking call that runs out
of time returns `None` or `false` and leaves the connection open.
*/

use thiserror::Error;

/// Common result type used throughout the SDK
pub type Result<T> = std::result::Result<T, MotionError>;

/// Error type for all transport and protocol operations
#[derive(Error, Debug)]
pub enum MotionError {
    /// The remote host actively refused the connection (service not running)
    #[error("connection refused by remote host {0}")]
    ConnectionRefused(String),

    /// Failure to establish or maintain the socket connection
    #[error("connection error: {0}")]
    Connection(String),

    /// Malformed frame or unexpected message content
    #[error("communication protocol error: {0}")]
    Protocol(String),

    /// Operation requires an open connection
    #[error("client is not connected")]
    NotConnected,

    /// I/O errors (take files, socket setup)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MotionError {
    /// Create a new connection error with a message
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a new protocol error with a message
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// True for errors that mean the remote service is not running
    pub fn is_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_))
    }
}
