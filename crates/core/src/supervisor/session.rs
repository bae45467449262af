//! Per-session state machine and query dispatch.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;

use mc_protocol::{MediaDatum, Query, SessionId, Tag};
use mc_runtime::{CancellationSource, CancellationToken, LinkedCancellation, MediaClient};

use super::snapshot::Snapshot;
use super::{SupervisorInner, run_cancellable};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Creating,
    Active,
    Destroying,
    Destroyed,
}

/// Shared state behind one logical session handle.
pub(crate) struct SessionInner {
    handle: u64,
    client: Arc<dyn MediaClient>,
    supervisor: Weak<SupervisorInner>,
    /// The session's own cancellation source; also covers the create call.
    own: CancellationSource,
    /// Derived signal: session source or supervisor source.
    link: LinkedCancellation,
    state: Mutex<SessionState>,
    id: Mutex<Option<SessionId>>,
    snapshot: Mutex<Option<Snapshot>>,
    /// Stamp of the most recent query submission; stale completions are
    /// discarded, so submission order wins.
    sequence: AtomicU64,
    /// Remote calls in flight for this session specifically.
    pending: AtomicU32,
    idle: Notify,
}

impl SessionInner {
    pub(crate) fn new(
        handle: u64,
        client: Arc<dyn MediaClient>,
        supervisor: Weak<SupervisorInner>,
        supervisor_token: &CancellationToken,
    ) -> Self {
        let own = CancellationSource::new();
        let link = LinkedCancellation::new(&own.token(), supervisor_token);

        Self {
            handle,
            client,
            supervisor,
            own,
            link,
            state: Mutex::new(SessionState::Creating),
            id: Mutex::new(None),
            snapshot: Mutex::new(None),
            sequence: AtomicU64::new(0),
            pending: AtomicU32::new(0),
            idle: Notify::new(),
        }
    }

    pub(crate) fn client(&self) -> &Arc<dyn MediaClient> {
        &self.client
    }

    pub(crate) fn supervisor(&self) -> Option<Arc<SupervisorInner>> {
        self.supervisor.upgrade()
    }

    pub(crate) fn link_token(&self) -> CancellationToken {
        self.link.token()
    }

    pub(crate) fn is_active(&self) -> bool {
        *self.state.lock() == SessionState::Active
    }

    pub(crate) fn remote_id(&self) -> Option<SessionId> {
        self.id.lock().clone()
    }

    /// Marks the handle live and binds it to its remote id.
    pub(crate) fn activate(&self, id: SessionId) {
        *self.id.lock() = Some(id);
        *self.state.lock() = SessionState::Active;
    }

    /// Marks a never-exposed handle destroyed and unregisters it.
    pub(crate) fn abandon(&self) {
        *self.state.lock() = SessionState::Destroyed;
        if let Some(supervisor) = self.supervisor.upgrade() {
            supervisor.sessions.remove(&self.handle);
        }
    }

    pub(crate) fn begin_op(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn end_op(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Resolves once no remote call is pending for this session. Runs on the
    /// dispatch thread, so the check cannot race a decrement.
    pub(crate) async fn wait_idle(&self) {
        loop {
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            self.idle.notified().await;
        }
    }
}

/// Live handle to one remote browsing session.
///
/// Handles are cheap to clone; all clones share one state machine, and
/// disposal through any of them is idempotent. Every method must be called
/// on the dispatch thread.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub(crate) fn new(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    /// Opens a container (`None` opens the catalog root).
    pub fn browse(
        &self,
        container: Option<MediaDatum>,
        on_done: impl FnOnce(Result<Snapshot>) + Send + 'static,
    ) -> Result<()> {
        self.submit(Query::Browse { container }, on_done)
    }

    /// Enumerates the distinct values of `tag`.
    pub fn list(
        &self,
        tag: Tag,
        on_done: impl FnOnce(Result<Snapshot>) + Send + 'static,
    ) -> Result<()> {
        self.submit(Query::List { tag }, on_done)
    }

    /// Items reachable from the `tag`/`value` pair.
    pub fn link(
        &self,
        tag: Tag,
        value: impl Into<String>,
        on_done: impl FnOnce(Result<Snapshot>) + Send + 'static,
    ) -> Result<()> {
        self.submit(
            Query::Link {
                tag,
                value: value.into(),
            },
            on_done,
        )
    }

    /// Items whose `tag` equals `value` exactly.
    pub fn match_(
        &self,
        tag: Tag,
        value: impl Into<String>,
        on_done: impl FnOnce(Result<Snapshot>) + Send + 'static,
    ) -> Result<()> {
        self.submit(
            Query::Match {
                tag,
                value: value.into(),
            },
            on_done,
        )
    }

    /// Free-text search across the catalog.
    pub fn search(
        &self,
        value: impl Into<String>,
        on_done: impl FnOnce(Result<Snapshot>) + Send + 'static,
    ) -> Result<()> {
        self.submit(
            Query::Search {
                value: value.into(),
            },
            on_done,
        )
    }

    /// The result descriptor of the most recent completed query, if any.
    /// Superseded snapshots stay readable through their own handles but are
    /// no longer reachable here.
    pub fn snapshot(&self) -> Option<Snapshot> {
        self.inner.snapshot.lock().clone()
    }

    pub fn is_disposed(&self) -> bool {
        matches!(
            *self.inner.state.lock(),
            SessionState::Destroying | SessionState::Destroyed
        )
    }

    fn submit(
        &self,
        query: Query,
        on_done: impl FnOnce(Result<Snapshot>) + Send + 'static,
    ) -> Result<()> {
        if !self.inner.is_active() {
            return Err(Error::SessionClosed);
        }
        let id = self.inner.remote_id().ok_or(Error::SessionClosed)?;

        let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let token = self.inner.link_token();
        let session = Arc::clone(&self.inner);

        tracing::debug!(session = %id, query = query.name(), sequence, "dispatching query");
        self.inner.begin_op();

        tokio::task::spawn_local(async move {
            let outcome =
                run_cancellable(&token, session.client.query(token.clone(), id, query)).await;
            session.end_op();

            match outcome {
                None => tracing::debug!("query abandoned by cancellation"),
                Some(Err(err)) if err.is_cancelled() => {}
                Some(Err(err)) => {
                    if session.sequence.load(Ordering::SeqCst) == sequence
                        && !token.is_cancelled()
                    {
                        on_done(Err(Error::RemoteOperation(err)));
                    } else {
                        tracing::debug!(error = %err, "stale query failure discarded");
                    }
                }
                Some(Ok(descriptor)) => {
                    let current = session.sequence.load(Ordering::SeqCst) == sequence
                        && !token.is_cancelled()
                        && session.is_active();
                    if current {
                        let snapshot = Snapshot::new(Arc::downgrade(&session), descriptor);
                        *session.snapshot.lock() = Some(snapshot.clone());
                        on_done(Ok(snapshot));
                    } else {
                        tracing::debug!("stale query result discarded");
                    }
                }
            }
        });

        Ok(())
    }

    /// Moves the session to `Destroying`, cancels any operation in flight
    /// for it, and destroys the remote session once nothing is pending (the
    /// remote destroy is moot when the supervisor is already cancelled).
    /// Idempotent; disposing twice is a no-op.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            match *state {
                SessionState::Destroying | SessionState::Destroyed => return,
                _ => *state = SessionState::Destroying,
            }
        }
        self.inner.own.cancel();

        let session = Arc::clone(&self.inner);
        if let Some(supervisor) = session.supervisor.upgrade() {
            supervisor.begin_task();
        }

        tokio::task::spawn_local(async move {
            session.wait_idle().await;

            let id = session.id.lock().take();
            let supervisor = session.supervisor.upgrade();

            match (id, &supervisor) {
                (Some(id), Some(supervisor)) if !supervisor.source.is_cancelled() => {
                    let token = supervisor.source.token();
                    let outcome = run_cancellable(
                        &token,
                        session.client.destroy(token.clone(), id.clone()),
                    )
                    .await;
                    match outcome {
                        None => {
                            tracing::debug!(session = %id, "remote destroy abandoned; supervisor cancelled")
                        }
                        Some(Err(err)) if err.is_cancelled() => {
                            tracing::debug!(session = %id, "remote destroy cancelled")
                        }
                        Some(Err(err)) => {
                            tracing::warn!(session = %id, error = %err, "remote destroy failed")
                        }
                        Some(Ok(_)) => tracing::debug!(session = %id, "remote session destroyed"),
                    }
                }
                (Some(id), _) => tracing::debug!(session = %id, "remote destroy moot"),
                (None, _) => {}
            }

            *session.state.lock() = SessionState::Destroyed;
            *session.snapshot.lock() = None;

            if let Some(supervisor) = supervisor {
                supervisor.sessions.remove(&session.handle);
                supervisor.end_task();
            }
        });
    }
}
