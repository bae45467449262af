//! Test support: a scriptable in-memory media endpoint.
//!
//! [`MockClient`] serves a numbered catalog for every query, mints
//! sequential session ids, counts every call, and can hold operations back
//! behind a gate to script cancellation races deterministically.

use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;

use mc_protocol::{
    ClientSnapshot, MediaDatum, MediaMetadata, MediaValue, Query, SessionId, Tag,
};
use mc_runtime::{CancellationToken, ClientError, MediaClient};

/// Tag carrying a mock item's uri-like identity (the item's index).
pub const URI_TAG: Tag = Tag(0);

struct MockState {
    total: u32,
    paused: Mutex<bool>,
    resumed: Notify,
    fail_next_query: AtomicBool,
    next_session: AtomicU32,
    created: AtomicU32,
    destroyed: AtomicU32,
    queries: AtomicU32,
    reads: AtomicU32,
}

impl MockState {
    /// Parks the operation while the client is paused.
    async fn gate(&self) {
        loop {
            let mut notified = pin!(self.resumed.notified());
            notified.as_mut().enable();
            if !*self.paused.lock() {
                return;
            }
            notified.await;
        }
    }
}

/// Scriptable in-memory [`MediaClient`] backed by a catalog of `total`
/// numbered items.
pub struct MockClient {
    state: Arc<MockState>,
}

impl MockClient {
    pub fn new(total: u32) -> Self {
        Self {
            state: Arc::new(MockState {
                total,
                paused: Mutex::new(false),
                resumed: Notify::new(),
                fail_next_query: AtomicBool::new(false),
                next_session: AtomicU32::new(1),
                created: AtomicU32::new(0),
                destroyed: AtomicU32::new(0),
                queries: AtomicU32::new(0),
                reads: AtomicU32::new(0),
            }),
        }
    }

    /// Holds every subsequent operation until [`resume`](Self::resume).
    pub fn pause(&self) {
        *self.state.paused.lock() = true;
    }

    /// Releases operations held by [`pause`](Self::pause).
    pub fn resume(&self) {
        *self.state.paused.lock() = false;
        self.state.resumed.notify_waiters();
    }

    /// Makes the next query fail with a remote error.
    pub fn fail_next_query(&self) {
        self.state.fail_next_query.store(true, Ordering::SeqCst);
    }

    pub fn sessions_created(&self) -> u32 {
        self.state.created.load(Ordering::SeqCst)
    }

    pub fn sessions_destroyed(&self) -> u32 {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> u32 {
        self.state.queries.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> u32 {
        self.state.reads.load(Ordering::SeqCst)
    }
}

/// One numbered catalog item.
fn item(index: u32) -> MediaDatum {
    let mut metadata = MediaMetadata::new();
    metadata.insert(URI_TAG, MediaValue::new(index.to_string()));
    MediaDatum::with_metadata(Vec::new(), metadata)
}

impl MediaClient for MockClient {
    fn create(&self, _cancel: CancellationToken) -> BoxFuture<'static, mc_runtime::Result<SessionId>> {
        let state = Arc::clone(&self.state);
        async move {
            state.gate().await;
            let n = state.next_session.fetch_add(1, Ordering::SeqCst);
            state.created.fetch_add(1, Ordering::SeqCst);
            Ok(SessionId::new(format!("mock-session-{n}")))
        }
        .boxed()
    }

    fn destroy(
        &self,
        _cancel: CancellationToken,
        session: SessionId,
    ) -> BoxFuture<'static, mc_runtime::Result<SessionId>> {
        let state = Arc::clone(&self.state);
        async move {
            state.gate().await;
            state.destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(session)
        }
        .boxed()
    }

    fn query(
        &self,
        _cancel: CancellationToken,
        _session: SessionId,
        query: Query,
    ) -> BoxFuture<'static, mc_runtime::Result<ClientSnapshot>> {
        let state = Arc::clone(&self.state);
        async move {
            state.gate().await;
            state.queries.fetch_add(1, Ordering::SeqCst);
            if state.fail_next_query.swap(false, Ordering::SeqCst) {
                return Err(ClientError::Remote {
                    name: "QueryError".to_string(),
                    message: format!("scripted failure for {}", query.name()),
                });
            }
            Ok(ClientSnapshot::new(query.name(), state.total, None))
        }
        .boxed()
    }

    fn read(
        &self,
        _cancel: CancellationToken,
        _session: SessionId,
        _snapshot: ClientSnapshot,
        index: u32,
        count: u32,
    ) -> BoxFuture<'static, mc_runtime::Result<Vec<MediaDatum>>> {
        let state = Arc::clone(&self.state);
        async move {
            state.gate().await;
            state.reads.fetch_add(1, Ordering::SeqCst);
            if index + count > state.total {
                return Err(ClientError::Protocol(format!(
                    "read window {}..{} exceeds total {}",
                    index,
                    index + count,
                    state.total
                )));
            }
            Ok((index..index + count).map(item).collect())
        }
        .boxed()
    }
}
