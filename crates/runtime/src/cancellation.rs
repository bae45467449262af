//! Cancellation sources, tokens, and two-source links.
//!
//! A [`CancellationSource`] owns a latching signal; any number of
//! [`CancellationToken`]s observe it. Observers are registered per token and
//! are revocable independently of the source's own lifetime, so neither side
//! of a registration depends on teardown order: dropping the source leaves
//! live tokens and registrations working against the latched state, and
//! dropping a registration after the source is gone is a no-op.
//!
//! [`LinkedCancellation`] derives a signal from two independent upstream
//! tokens. The supervisor uses it to cancel a remote operation when *either*
//! the owning session is disposed *or* the whole supervisor is cancelled,
//! and those two teardowns can race in any order.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;

type Observer = Box<dyn FnOnce() + Send>;

/// Latch state shared by a source, its tokens, and their registrations.
struct Shared {
    signaled: AtomicBool,
    observers: Mutex<ObserverMap>,
}

#[derive(Default)]
struct ObserverMap {
    next_id: u64,
    entries: HashMap<u64, Observer>,
}

impl Shared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            signaled: AtomicBool::new(false),
            observers: Mutex::new(ObserverMap::default()),
        })
    }

    /// Latches the signal and fires every registered observer exactly once.
    fn signal(&self) {
        if self.signaled.swap(true, Ordering::SeqCst) {
            return;
        }

        let drained: Vec<Observer> = {
            let mut map = self.observers.lock();
            map.entries.drain().map(|(_, observer)| observer).collect()
        };

        // Invoked outside the lock: an observer may register or revoke other
        // observers (a linked source signalling its own observers).
        for observer in drained {
            observer();
        }
    }

    /// Registers `observer`, or fires it inline when the signal already
    /// latched. The signaled re-check happens under the observer lock so a
    /// racing `signal()` either drains the new entry or is observed here.
    fn register(self: &Arc<Self>, observer: Observer) -> CancelRegistration {
        if self.signaled.load(Ordering::SeqCst) {
            observer();
            return CancelRegistration::spent();
        }

        let id = {
            let mut map = self.observers.lock();
            if self.signaled.load(Ordering::SeqCst) {
                drop(map);
                observer();
                return CancelRegistration::spent();
            }
            let id = map.next_id;
            map.next_id += 1;
            map.entries.insert(id, observer);
            id
        };

        CancelRegistration {
            shared: Arc::downgrade(self),
            id,
        }
    }
}

/// Owner of a latching cancellation signal.
///
/// Dropping the source does not revert or free the signal: tokens keep the
/// latched state alive for as long as anyone can still ask about it.
pub struct CancellationSource {
    shared: Arc<Shared>,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self {
            shared: Shared::new(),
        }
    }

    /// Latches the signal. Idempotent; observers fire exactly once.
    pub fn cancel(&self) {
        self.shared.signal();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.signaled.load(Ordering::SeqCst)
    }

    /// A read-only handle onto this source's signal.
    pub fn token(&self) -> CancellationToken {
        CancellationToken {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only handle onto a cancellation signal.
#[derive(Clone)]
pub struct CancellationToken {
    shared: Arc<Shared>,
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        self.shared.signaled.load(Ordering::SeqCst)
    }

    /// Registers `observer` to fire exactly once when the signal latches;
    /// fires inline when it already has. Dropping the returned registration
    /// revokes the observer.
    pub fn on_cancelled(&self, observer: impl FnOnce() + Send + 'static) -> CancelRegistration {
        self.shared.register(Box::new(observer))
    }

    /// A future resolving once the signal latches.
    pub fn cancelled(&self) -> Cancelled {
        Cancelled {
            token: self.clone(),
            registration: None,
        }
    }
}

/// Revocable handle for an observer registered with
/// [`CancellationToken::on_cancelled`].
///
/// Dropping it removes the observer if it has not fired; once the signal has
/// latched, or the underlying state is gone, dropping is a no-op.
pub struct CancelRegistration {
    shared: Weak<Shared>,
    id: u64,
}

impl CancelRegistration {
    fn spent() -> Self {
        Self {
            shared: Weak::new(),
            id: 0,
        }
    }

    /// Explicitly revokes the observer. Equivalent to dropping.
    pub fn revoke(self) {}
}

impl Drop for CancelRegistration {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.observers.lock().entries.remove(&self.id);
        }
    }
}

/// Future returned by [`CancellationToken::cancelled`].
///
/// Each poll replaces its waker registration, so only the most recent waker
/// is retained and the registration dies with the future.
pub struct Cancelled {
    token: CancellationToken,
    registration: Option<CancelRegistration>,
}

impl Future for Cancelled {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if this.token.is_cancelled() {
            return Poll::Ready(());
        }

        let waker = cx.waker().clone();
        this.registration = Some(this.token.on_cancelled(move || waker.wake()));

        if this.token.is_cancelled() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Derived cancellation signal over two upstream tokens.
///
/// The link is signaled if and only if either upstream is, whether that
/// happened before or after the link was constructed. Its own state latches:
/// once signaled it never reverts, including across upstream disposal in any
/// order. Dropping the link revokes its upstream observations without
/// cancelling either upstream.
pub struct LinkedCancellation {
    own: CancellationSource,
    _registrations: [CancelRegistration; 2],
}

impl LinkedCancellation {
    pub fn new(a: &CancellationToken, b: &CancellationToken) -> Self {
        let own = CancellationSource::new();

        let shared = Arc::clone(&own.shared);
        let register_a = a.on_cancelled(move || shared.signal());

        let shared = Arc::clone(&own.shared);
        let register_b = b.on_cancelled(move || shared.signal());

        Self {
            own,
            _registrations: [register_a, register_b],
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.own.is_cancelled()
    }

    /// A token observing the derived signal. Remains valid after the link
    /// itself is dropped.
    pub fn token(&self) -> CancellationToken {
        self.own.token()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_cancel_latches_and_is_idempotent() {
        let source = CancellationSource::new();
        let token = source.token();

        assert!(!token.is_cancelled());
        source.cancel();
        source.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_observer_fires_exactly_once() {
        let source = CancellationSource::new();
        let count = Arc::new(AtomicU32::new(0));

        let observed = Arc::clone(&count);
        let registration = source
            .token()
            .on_cancelled(move || {
                observed.fetch_add(1, Ordering::SeqCst);
            });

        source.cancel();
        source.cancel();
        drop(registration);

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_fires_inline_when_already_cancelled() {
        let source = CancellationSource::new();
        source.cancel();

        let count = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&count);
        let _registration = source
            .token()
            .on_cancelled(move || {
                observed.fetch_add(1, Ordering::SeqCst);
            });

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_revoked_observer_never_fires() {
        let source = CancellationSource::new();
        let count = Arc::new(AtomicU32::new(0));

        let observed = Arc::clone(&count);
        let registration = source
            .token()
            .on_cancelled(move || {
                observed.fetch_add(1, Ordering::SeqCst);
            });

        registration.revoke();
        source.cancel();

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_token_outlives_source() {
        let source = CancellationSource::new();
        let token = source.token();

        source.cancel();
        drop(source);

        assert!(token.is_cancelled());
    }

    #[test]
    fn test_registration_outlives_source() {
        let source = CancellationSource::new();
        let registration = source.token().on_cancelled(|| {});
        let token = source.token();

        drop(source);
        drop(token);

        // All state holders are gone; revoking must still be a no-op.
        registration.revoke();
    }

    #[test]
    fn test_link_signals_on_a_only() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();
        let link = LinkedCancellation::new(&a.token(), &b.token());

        a.cancel();

        assert!(link.is_cancelled());
        assert!(!b.is_cancelled());
    }

    #[test]
    fn test_link_signals_on_b_only() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();
        let link = LinkedCancellation::new(&a.token(), &b.token());

        b.cancel();

        assert!(link.is_cancelled());
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_link_signals_once_on_both() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();
        let link = LinkedCancellation::new(&a.token(), &b.token());

        let count = Arc::new(AtomicU32::new(0));
        let observed = Arc::clone(&count);
        let _registration = link.token().on_cancelled(move || {
            observed.fetch_add(1, Ordering::SeqCst);
        });

        a.cancel();
        b.cancel();

        assert!(link.is_cancelled());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_link_observes_signal_from_before_construction() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();
        a.cancel();

        let link = LinkedCancellation::new(&a.token(), &b.token());

        assert!(link.is_cancelled());
    }

    #[test]
    fn test_link_survives_source_disposal_then_cancel() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();
        let link = LinkedCancellation::new(&a.token(), &b.token());

        drop(a);
        b.cancel();

        assert!(link.is_cancelled());
    }

    #[test]
    fn test_link_unsignaled_when_both_disposed_uncancelled() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();
        let link = LinkedCancellation::new(&a.token(), &b.token());

        drop(a);
        drop(b);

        assert!(!link.is_cancelled());
    }

    #[test]
    fn test_dropping_link_releases_upstream_observation() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();
        let link = LinkedCancellation::new(&a.token(), &b.token());
        let token = link.token();

        drop(link);
        a.cancel();

        // The link's own signal is frozen at its state when dropped.
        assert!(!token.is_cancelled());
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
    }

    #[test]
    fn test_link_token_latches_across_link_drop() {
        let a = CancellationSource::new();
        let b = CancellationSource::new();
        let link = LinkedCancellation::new(&a.token(), &b.token());
        let token = link.token();

        a.cancel();
        drop(link);
        drop(b);

        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_on_signal() {
        let source = CancellationSource::new();
        let token = source.token();

        let waiter = tokio::spawn(async move {
            token.cancelled().await;
        });

        tokio::task::yield_now().await;
        source.cancel();

        waiter.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_immediately_when_signaled() {
        let source = CancellationSource::new();
        source.cancel();

        source.token().cancelled().await;
    }
}
