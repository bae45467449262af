//! Error types for the media client boundary.

use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by a remote media client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// The operation observed its cancellation signal before completing.
    ///
    /// The supervision core absorbs this variant: a cancelled operation's
    /// completion callback is never invoked.
    #[error("operation cancelled")]
    Cancelled,

    /// The remote endpoint rejected or failed the operation.
    #[error("{name}: {message}")]
    Remote {
        /// Error type name reported by the endpoint
        name: String,
        /// Human-readable error message
        message: String,
    },

    /// The response did not have the promised shape.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl ClientError {
    /// Returns true if the operation was cancelled rather than failed.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}
