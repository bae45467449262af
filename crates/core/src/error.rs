//! Error types for the supervision and caching core.

use mc_runtime::ClientError;
use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the supervision and caching core.
///
/// Cancellation is deliberately absent: a cancelled operation's completion
/// callback simply never fires.
#[derive(Debug, Error)]
pub enum Error {
    /// A cache session with this name is already registered.
    #[error("cache session '{0}' already exists")]
    DuplicateSession(String),

    /// The session's fetch function failed or was cancelled. The cache holds
    /// no state for the failed ids; the request is retryable.
    #[error("metadata fetch failed")]
    Fetch(#[source] ClientError),

    /// Operation on a session or cache that has been destroyed.
    #[error("session is closed")]
    SessionClosed,

    /// The remote call failed for a reason other than cancellation.
    #[error("remote operation failed")]
    RemoteOperation(#[source] ClientError),
}

impl Error {
    /// Returns true if this is a closed-session error.
    pub fn is_session_closed(&self) -> bool {
        matches!(self, Error::SessionClosed)
    }
}
