//! Snapshot pagination.

use std::sync::{Arc, Weak};

use mc_protocol::{ClientSnapshot, Fragment};

use super::session::SessionInner;
use super::run_cancellable;
use crate::error::{Error, Result};

/// Immutable descriptor of a query result set, bound to the session that
/// produced it.
///
/// A snapshot stays valid for reading after a newer query supersedes it;
/// only destroying the owning session closes it. Fragments read from it are
/// independent of one another.
#[derive(Clone)]
pub struct Snapshot {
    inner: Arc<SnapshotInner>,
}

struct SnapshotInner {
    session: Weak<SessionInner>,
    descriptor: ClientSnapshot,
}

impl Snapshot {
    pub(crate) fn new(session: Weak<SessionInner>, descriptor: ClientSnapshot) -> Self {
        Self {
            inner: Arc::new(SnapshotInner {
                session,
                descriptor,
            }),
        }
    }

    /// Identity of the container this snapshot describes.
    pub fn container(&self) -> &str {
        self.inner.descriptor.container()
    }

    /// Number of items in the result set.
    pub fn total(&self) -> u32 {
        self.inner.descriptor.total()
    }

    /// Per-letter item counts, when the endpoint supplies them.
    pub fn alpha(&self) -> Option<&[u32]> {
        self.inner.descriptor.alpha()
    }

    /// Reads `count` items starting at `index`. A window reaching past
    /// `total` is clamped to the available tail, so over-asking yields a
    /// short (possibly empty) fragment rather than an error. Must be called
    /// on the dispatch thread.
    pub fn read(
        &self,
        index: u32,
        count: u32,
        on_done: impl FnOnce(Result<Fragment>) + Send + 'static,
    ) -> Result<()> {
        let session = self.inner.session.upgrade().ok_or(Error::SessionClosed)?;
        if !session.is_active() {
            return Err(Error::SessionClosed);
        }
        let id = session.remote_id().ok_or(Error::SessionClosed)?;

        let total = self.inner.descriptor.total();
        let count = count.min(total.saturating_sub(index));
        let token = session.link_token();

        if count == 0 {
            // Empty tail: complete asynchronously without a remote round-trip.
            tokio::task::spawn_local(async move {
                if !token.is_cancelled() {
                    on_done(Ok(Fragment::new(index, Vec::new())));
                }
            });
            return Ok(());
        }

        let descriptor = self.inner.descriptor.clone();
        let client = Arc::clone(session.client());
        tracing::debug!(session = %id, index, count, "reading fragment");
        session.begin_op();

        tokio::task::spawn_local(async move {
            let outcome = run_cancellable(
                &token,
                client.read(token.clone(), id, descriptor, index, count),
            )
            .await;
            session.end_op();

            match outcome {
                None => tracing::debug!("read abandoned by cancellation"),
                Some(Err(err)) if err.is_cancelled() => {}
                Some(Err(err)) => on_done(Err(Error::RemoteOperation(err))),
                Some(Ok(mut items)) => {
                    items.truncate(count as usize);
                    on_done(Ok(Fragment::new(index, items)));
                }
            }
        });

        Ok(())
    }
}
