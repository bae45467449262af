//! Session supervision over one remote media endpoint.
//!
//! The [`Supervisor`] owns a pool of logical browsing sessions, each wrapping
//! one remote session on a shared [`MediaClient`]. Every remote operation
//! runs under a cancellation token linking the owning session's own source
//! with the supervisor's, so tearing down either side abandons the operation
//! cleanly - its completion callback simply never fires.
//!
//! # Lifecycle
//!
//! ```text
//! Session:    Creating ──create resolves──▶ Active ──dispose──▶ Destroying ──▶ Destroyed
//!                 └───────cancel before create resolves──────▶ Destroying ──▶ Destroyed
//! Supervisor: Running ──cancel()──▶ Cancelling ──dispose()──▶ Disposed
//! ```
//!
//! Callers drive the teardown: cancel the supervisor, dispose each session
//! they created, then dispose the supervisor. All entry points must run on
//! the shared dispatch thread (inside its `LocalSet`); `Supervisor::dispose`
//! is the one exception - it blocks, and must be called from outside.

mod session;
mod snapshot;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use mc_runtime::{CancellationSource, CancellationToken, MediaClient};

use crate::error::{Error, Result};
use session::SessionInner;

pub use session::Session;
pub use snapshot::Snapshot;

/// Races `operation` against `token`; `None` means the token won and the
/// operation was abandoned.
pub(crate) async fn run_cancellable<T>(
    token: &CancellationToken,
    operation: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = operation => Some(result),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorState {
    Running,
    Cancelling,
    Disposed,
}

pub(crate) struct SupervisorInner {
    /// Shared client binding; released on dispose.
    client: Mutex<Option<Arc<dyn MediaClient>>>,
    pub(crate) source: CancellationSource,
    state: Mutex<SupervisorState>,
    pub(crate) sessions: DashMap<u64, Arc<SessionInner>>,
    next_handle: AtomicU64,
    /// In-flight create/destroy follow-through, waited on by dispose.
    tasks: Mutex<usize>,
    settled: Condvar,
}

impl SupervisorInner {
    pub(crate) fn begin_task(&self) {
        *self.tasks.lock() += 1;
    }

    pub(crate) fn end_task(&self) {
        let mut tasks = self.tasks.lock();
        *tasks -= 1;
        if *tasks == 0 {
            self.settled.notify_all();
        }
    }

    fn wait_settled(&self) {
        let mut tasks = self.tasks.lock();
        while *tasks > 0 {
            self.settled.wait(&mut tasks);
        }
    }
}

/// Owner of a pool of logical browsing sessions against one remote endpoint.
pub struct Supervisor {
    inner: Arc<SupervisorInner>,
}

impl Supervisor {
    pub fn new(client: Arc<dyn MediaClient>) -> Self {
        Self {
            inner: Arc::new(SupervisorInner {
                client: Mutex::new(Some(client)),
                source: CancellationSource::new(),
                state: Mutex::new(SupervisorState::Running),
                sessions: DashMap::new(),
                next_handle: AtomicU64::new(1),
                tasks: Mutex::new(0),
                settled: Condvar::new(),
            }),
        }
    }

    /// Allocates a session handle and creates its remote session. On success
    /// `on_ready` receives the live [`Session`]; on remote failure it
    /// receives the error; on cancellation it is never invoked and the
    /// handle is destroyed without ever being exposed.
    pub fn create_session(&self, on_ready: impl FnOnce(Result<Session>) + Send + 'static) {
        let inner = Arc::clone(&self.inner);

        if *inner.state.lock() != SupervisorState::Running {
            tracing::debug!("create_session after cancel; callback dropped");
            return;
        }
        let Some(client) = inner.client.lock().clone() else {
            tracing::debug!("create_session after dispose; callback dropped");
            return;
        };

        let handle = inner.next_handle.fetch_add(1, Ordering::SeqCst);
        let session_inner = Arc::new(SessionInner::new(
            handle,
            client,
            Arc::downgrade(&inner),
            &inner.source.token(),
        ));
        inner.sessions.insert(handle, Arc::clone(&session_inner));
        inner.begin_task();

        let token = session_inner.link_token();
        tokio::task::spawn_local(async move {
            let outcome =
                run_cancellable(&token, session_inner.client().create(token.clone())).await;

            match outcome {
                None => {
                    tracing::debug!("session create abandoned by cancellation");
                    session_inner.abandon();
                }
                Some(Err(err)) if err.is_cancelled() => {
                    session_inner.abandon();
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "remote session create failed");
                    session_inner.abandon();
                    on_ready(Err(Error::RemoteOperation(err)));
                }
                Some(Ok(id)) if token.is_cancelled() => {
                    tracing::debug!(session = %id, "session cancelled as create resolved");
                    session_inner.abandon();
                }
                Some(Ok(id)) => {
                    tracing::debug!(session = %id, "remote session created");
                    session_inner.activate(id);
                    on_ready(Ok(Session::new(Arc::clone(&session_inner))));
                }
            }

            if let Some(supervisor) = session_inner.supervisor() {
                supervisor.end_task();
            }
        });
    }

    /// Signals the supervisor's cancellation source, cancelling every live
    /// session's linked token without destroying the sessions themselves.
    /// Idempotent.
    pub fn cancel(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state != SupervisorState::Running {
                return;
            }
            *state = SupervisorState::Cancelling;
        }
        tracing::debug!("supervisor cancelling");
        self.inner.source.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.source.is_cancelled()
    }

    /// Number of sessions not yet destroyed, counting those still creating.
    pub fn live_sessions(&self) -> usize {
        self.inner.sessions.len()
    }

    /// Releases the client binding once all session follow-through has
    /// settled. Callers cancel first and dispose every session they created;
    /// violations are logged, not panicked. Idempotent. Blocks, so it must
    /// not be called from the dispatch thread.
    pub fn dispose(&self) {
        {
            let mut state = self.inner.state.lock();
            match *state {
                SupervisorState::Disposed => return,
                SupervisorState::Running => {
                    tracing::error!("supervisor disposed without cancel; cancelling now");
                    *state = SupervisorState::Cancelling;
                }
                SupervisorState::Cancelling => {}
            }
        }
        self.inner.source.cancel();
        self.inner.wait_settled();

        if !self.inner.sessions.is_empty() {
            tracing::error!(
                live = self.inner.sessions.len(),
                "supervisor disposed with live sessions"
            );
        }

        *self.inner.client.lock() = None;
        *self.inner.state.lock() = SupervisorState::Disposed;
        tracing::debug!("supervisor disposed");
    }
}
