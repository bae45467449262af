//! The remote media client boundary.

use futures_util::future::BoxFuture;
use mc_protocol::{ClientSnapshot, MediaDatum, Query, SessionId};

use crate::cancellation::CancellationToken;
use crate::error::Result;

/// Interface to the remote media-catalog service.
///
/// The supervision core drives everything through this trait; real endpoints
/// and test mocks implement it. Every operation takes a cancellation token
/// and resolves asynchronously on the shared dispatch thread. An
/// implementation may either observe the token itself (resolving to
/// [`ClientError::Cancelled`]) or ignore it entirely - the core also races
/// every call against the token and abandons the future when the token wins.
///
/// [`ClientError::Cancelled`]: crate::ClientError::Cancelled
pub trait MediaClient: Send + Sync {
    /// Creates a remote browsing session and resolves to its id.
    fn create(&self, cancel: CancellationToken) -> BoxFuture<'static, Result<SessionId>>;

    /// Destroys a remote browsing session. Called at most once per created
    /// session.
    fn destroy(
        &self,
        cancel: CancellationToken,
        session: SessionId,
    ) -> BoxFuture<'static, Result<SessionId>>;

    /// Runs one browse-family query in `session`, superseding the session's
    /// previous result set on the remote side.
    fn query(
        &self,
        cancel: CancellationToken,
        session: SessionId,
        query: Query,
    ) -> BoxFuture<'static, Result<ClientSnapshot>>;

    /// Reads `count` items starting at `index` out of `snapshot`, returning
    /// the bare item page (the core stamps on the offset). The caller
    /// guarantees `index + count <= snapshot.total()`.
    fn read(
        &self,
        cancel: CancellationToken,
        session: SessionId,
        snapshot: ClientSnapshot,
        index: u32,
        count: u32,
    ) -> BoxFuture<'static, Result<Vec<MediaDatum>>>;
}
