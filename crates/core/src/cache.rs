//! Bounded identity cache for metadata-by-id lookups.
//!
//! Many logical browsing sessions reference overlapping ids - the same album
//! is reached from a "by artist" view and a "by genre" view - so one shared
//! bounded cache amortizes the fetch cost across all of them, with a global
//! least-recently-used order bounding memory under unbounded browsing depth.
//!
//! Sessions are named registrations binding a caller-supplied fetch function.
//! A session's fetch function is only ever invoked with ids absent from the
//! cache at request time, deduplicated, in a single call per request.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

use mc_protocol::{MediaId, MediaMetadata};
use mc_runtime::ClientError;

use crate::error::{Error, Result};

/// One fetched metadata record. Immutable once inserted; shared by reference
/// with every caller that requests its id.
#[derive(Debug, Clone, PartialEq)]
pub struct IdCacheEntry {
    metadata: MediaMetadata,
    uri: String,
}

impl IdCacheEntry {
    pub fn new(metadata: MediaMetadata, uri: impl Into<String>) -> Self {
        Self {
            metadata,
            uri: uri.into(),
        }
    }

    pub fn metadata(&self) -> &MediaMetadata {
        &self.metadata
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }
}

/// Fetch function bound to a cache session: ids in, entries out, same order,
/// one entry per id.
pub type FetchFn = dyn Fn(Vec<MediaId>) -> BoxFuture<'static, std::result::Result<Vec<IdCacheEntry>, ClientError>>
    + Send
    + Sync;

struct CacheState {
    entries: HashMap<MediaId, Arc<IdCacheEntry>>,
    /// Recency order, least recently used first. Promotion is remove+push;
    /// linear, bounded by capacity.
    recency: Vec<MediaId>,
    sessions: HashSet<String>,
    disposed: bool,
}

impl CacheState {
    fn promote(&mut self, id: MediaId) {
        if let Some(position) = self.recency.iter().position(|&entry| entry == id) {
            self.recency.remove(position);
        }
        self.recency.push(id);
    }
}

struct CacheShared {
    capacity: usize,
    state: Mutex<CacheState>,
}

/// Shared bounded store mapping media ids to fetched entries.
///
/// Capacity is fixed at construction. Eviction is least-recently-used across
/// all entries, regardless of which session last touched them; recency is
/// updated on both read hits and inserts.
pub struct IdCache {
    shared: Arc<CacheShared>,
}

impl IdCache {
    /// Creates a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                capacity,
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    recency: Vec::new(),
                    sessions: HashSet::new(),
                    disposed: false,
                }),
            }),
        }
    }

    /// Registers a named session bound to `fetch`. The name must be unique
    /// among currently-live sessions on this cache.
    pub fn create_session<F>(&self, name: impl Into<String>, fetch: F) -> Result<IdCacheSession>
    where
        F: Fn(Vec<MediaId>) -> BoxFuture<'static, std::result::Result<Vec<IdCacheEntry>, ClientError>>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        let mut state = self.shared.state.lock();

        if state.disposed {
            return Err(Error::SessionClosed);
        }
        if !state.sessions.insert(name.clone()) {
            return Err(Error::DuplicateSession(name));
        }

        tracing::debug!(session = %name, "cache session registered");

        Ok(IdCacheSession {
            name,
            fetch: Box::new(fetch),
            shared: Arc::clone(&self.shared),
            disposed: AtomicBool::new(false),
        })
    }

    /// Number of entries currently cached.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invalidates all entries and all sessions. Idempotent; subsequent
    /// session operations fail with [`Error::SessionClosed`].
    pub fn dispose(&self) {
        let mut state = self.shared.state.lock();
        state.disposed = true;
        state.entries.clear();
        state.recency.clear();
        state.sessions.clear();
    }
}

/// Named view onto an [`IdCache`], bound to one fetch function.
pub struct IdCacheSession {
    name: String,
    fetch: Box<FetchFn>,
    shared: Arc<CacheShared>,
    disposed: AtomicBool,
}

impl std::fmt::Debug for IdCacheSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdCacheSession")
            .field("name", &self.name)
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl IdCacheSession {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves `ids` to cached entries, in input order, one entry per
    /// requested id. Duplicate ids resolve to the same entry reference.
    ///
    /// Ids already cached are served from the map (and promoted to most
    /// recently used); the rest are fetched in one deduplicated call to the
    /// session's fetch function and inserted, evicting least-recently-used
    /// entries until the cache is back within capacity. A failed or
    /// cancelled fetch leaves the cache unchanged for those ids.
    pub async fn entries(&self, ids: &[MediaId]) -> Result<Vec<Arc<IdCacheEntry>>> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }

        let mut resolved: HashMap<MediaId, Arc<IdCacheEntry>> = HashMap::new();
        let mut missing: Vec<MediaId> = Vec::new();

        {
            let mut state = self.shared.state.lock();
            if state.disposed {
                return Err(Error::SessionClosed);
            }

            for &id in ids {
                if resolved.contains_key(&id) || missing.contains(&id) {
                    continue;
                }
                match state.entries.get(&id).cloned() {
                    Some(entry) => {
                        state.promote(id);
                        resolved.insert(id, entry);
                    }
                    None => missing.push(id),
                }
            }
        }

        if !missing.is_empty() {
            let fetched = (self.fetch)(missing.clone()).await.map_err(Error::Fetch)?;

            if fetched.len() != missing.len() {
                return Err(Error::Fetch(ClientError::Protocol(format!(
                    "fetch returned {} entries for {} ids",
                    fetched.len(),
                    missing.len()
                ))));
            }

            let mut state = self.shared.state.lock();
            if state.disposed {
                return Err(Error::SessionClosed);
            }

            for (&id, entry) in missing.iter().zip(fetched) {
                // Another task may have fetched the same id while we were
                // suspended; keep the incumbent so duplicate requests keep
                // resolving to one reference.
                match state.entries.get(&id).cloned() {
                    Some(existing) => {
                        state.promote(id);
                        resolved.insert(id, existing);
                    }
                    None => {
                        let entry = Arc::new(entry);
                        state.entries.insert(id, Arc::clone(&entry));
                        state.recency.push(id);
                        resolved.insert(id, entry);
                    }
                }
            }

            // Just-inserted ids sit at the most-recently-used end, so the
            // evicted set is exactly the oldest size-capacity survivors.
            while state.entries.len() > self.shared.capacity && !state.recency.is_empty() {
                let oldest = state.recency.remove(0);
                state.entries.remove(&oldest);
                tracing::debug!(id = oldest, "evicted least-recently-used entry");
            }
        }

        ids.iter()
            .map(|id| resolved.get(id).cloned().ok_or(Error::SessionClosed))
            .collect()
    }

    /// Unregisters the session name. Cached entries remain - the cache is
    /// shared. Idempotent.
    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::SeqCst) {
            self.shared.state.lock().sessions.remove(&self.name);
            tracing::debug!(session = %self.name, "cache session unregistered");
        }
    }
}

impl Drop for IdCacheSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use futures_util::FutureExt;

    use super::*;

    fn uri_fetch(ids: Vec<MediaId>) -> BoxFuture<'static, std::result::Result<Vec<IdCacheEntry>, ClientError>> {
        async move {
            Ok(ids
                .into_iter()
                .map(|id| IdCacheEntry::new(MediaMetadata::new(), id.to_string()))
                .collect())
        }
        .boxed()
    }

    #[tokio::test]
    async fn test_entries_resolve_in_input_order() {
        let cache = IdCache::new(10);
        let session = cache.create_session("order", uri_fetch).unwrap();

        let entries = session.entries(&[5, 2, 5, 9]).await.unwrap();

        let uris: Vec<&str> = entries.iter().map(|entry| entry.uri()).collect();
        assert_eq!(uris, ["5", "2", "5", "9"]);
        assert!(Arc::ptr_eq(&entries[0], &entries[2]));
    }

    #[tokio::test]
    async fn test_size_never_exceeds_capacity() {
        let cache = IdCache::new(8);
        let session = cache.create_session("bound", uri_fetch).unwrap();

        for start in (0..64).step_by(4) {
            let ids: Vec<MediaId> = (start..start + 4).collect();
            session.entries(&ids).await.unwrap();
            assert!(cache.len() <= 8);
        }
    }

    #[tokio::test]
    async fn test_read_hit_promotes_against_eviction() {
        let cache = IdCache::new(4);
        let session = cache.create_session("promote", uri_fetch).unwrap();

        session.entries(&[1, 2, 3, 4]).await.unwrap();
        // Touch 1 so 2 becomes the eviction candidate.
        session.entries(&[1]).await.unwrap();
        session.entries(&[5]).await.unwrap();

        let before = cache.len();
        session.entries(&[1]).await.unwrap();
        // 1 survived the eviction: still a pure hit.
        assert_eq!(cache.len(), before);

        session.entries(&[2]).await.unwrap();
        // 2 did not: refetching it displaced another entry.
        assert_eq!(cache.len(), 4);
    }

    #[tokio::test]
    async fn test_duplicate_session_name_rejected() {
        let cache = IdCache::new(4);
        let _session = cache.create_session("twin", uri_fetch).unwrap();

        match cache.create_session("twin", uri_fetch) {
            Err(Error::DuplicateSession(name)) => assert_eq!(name, "twin"),
            other => panic!("expected DuplicateSession, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_name_reusable_after_dispose() {
        let cache = IdCache::new(4);
        let session = cache.create_session("reuse", uri_fetch).unwrap();

        session.entries(&[1]).await.unwrap();
        session.dispose();
        session.dispose();

        let replacement = cache.create_session("reuse", uri_fetch).unwrap();
        // The shared entry survived the first session's disposal.
        replacement.entries(&[1]).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_disposed_session_rejects_requests() {
        let cache = IdCache::new(4);
        let session = cache.create_session("closed", uri_fetch).unwrap();

        session.dispose();

        assert!(matches!(
            session.entries(&[1]).await,
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_cache_dispose_invalidates_sessions_and_entries() {
        let cache = IdCache::new(4);
        let session = cache.create_session("doomed", uri_fetch).unwrap();

        session.entries(&[1, 2]).await.unwrap();
        cache.dispose();

        assert!(cache.is_empty());
        assert!(matches!(
            session.entries(&[3]).await,
            Err(Error::SessionClosed)
        ));
        assert!(matches!(
            cache.create_session("late", uri_fetch),
            Err(Error::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_short_fetch_result_is_a_fetch_error() {
        let cache = IdCache::new(4);
        let session = cache
            .create_session("short", |_ids| {
                async { Ok::<Vec<IdCacheEntry>, ClientError>(Vec::new()) }.boxed()
            })
            .unwrap();

        assert!(matches!(
            session.entries(&[1, 2]).await,
            Err(Error::Fetch(ClientError::Protocol(_)))
        ));
        assert!(cache.is_empty());
    }
}
