pub mod key;

pub use key::QueryKey;

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::session::SessionHandle;
use crate::error::ApiError;

/// Lifecycle of a cached query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Idle,
    Loading,
    Success,
    Error,
}

/// One cached query result.
///
/// A failed fetch keeps the previous value (if any) alongside the error, so
/// the UI can keep showing stale data while surfacing the failure.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: QueryStatus,
    pub value: Option<serde_json::Value>,
    pub error: Option<ApiError>,
    pub fetched_at: Option<Instant>,
    stale_after: Option<Instant>,
    stale: bool,
}

impl CacheEntry {
    fn idle() -> Self {
        Self {
            status: QueryStatus::Idle,
            value: None,
            error: None,
            fetched_at: None,
            stale_after: None,
            stale: false,
        }
    }

    fn success(value: serde_json::Value, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            status: QueryStatus::Success,
            value: Some(value),
            error: None,
            fetched_at: Some(now),
            stale_after: Some(now + ttl),
            stale: false,
        }
    }

    /// Fresh means: successful, not invalidated, and inside the TTL window.
    pub fn is_fresh(&self) -> bool {
        self.status == QueryStatus::Success
            && !self.stale
            && self.stale_after.map_or(false, |t| Instant::now() < t)
    }

    /// Typed view of the entry.
    ///
    /// `Err` carries the stored fetch error; `Ok(None)` means the query has
    /// no value yet (idle or still loading); `Ok(Some(..))` is the decoded
    /// cached value.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, ApiError> {
        if self.status == QueryStatus::Error {
            if let Some(err) = &self.error {
                return Err(err.clone());
            }
        }
        match &self.value {
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                ApiError::Validation(format!("Cached value does not match expected type: {}", e))
            }),
            None => Ok(None),
        }
    }
}

type BoxedFetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<serde_json::Value, ApiError>> + Send + Sync>;

struct CacheInner {
    session: SessionHandle,
    ttl: Duration,
    entries: Mutex<HashMap<QueryKey, CacheEntry>>,
    fetchers: Mutex<HashMap<QueryKey, BoxedFetcher>>,
    fetch_locks: Mutex<HashMap<QueryKey, Arc<tokio::sync::Mutex<()>>>>,
    observers: Mutex<HashMap<QueryKey, usize>>,
    // Bumped on clear(); fetches started under an older generation discard
    // their result instead of repopulating the cache.
    generation: AtomicU64,
}

/// Keyed, time-aware cache of server-fetched collections.
///
/// - at most one fetch is in flight per key; concurrent callers share it
/// - keys that require authentication resolve to `Idle` while logged out
/// - `invalidate` marks an entry stale; a background refetch runs only while
///   someone is observing the key, otherwise the refetch waits for the next
///   access
/// - `clear` drops everything, including results of fetches still in flight
///
/// Cheap to clone; all clones share the same store.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<CacheInner>,
}

impl QueryCache {
    pub fn new(session: SessionHandle, ttl: Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                session,
                ttl,
                entries: Mutex::new(HashMap::new()),
                fetchers: Mutex::new(HashMap::new()),
                fetch_locks: Mutex::new(HashMap::new()),
                observers: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Serve the cached value for `key`, fetching through `fetcher` when the
    /// entry is missing, stale, or expired. The fetcher is remembered so
    /// `invalidate` can refetch for active observers later.
    pub async fn get_or_fetch<T, F, Fut>(&self, key: QueryKey, fetcher: F) -> CacheEntry
    where
        T: Serialize + Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
    {
        let erased: BoxedFetcher = Arc::new(move || {
            let fut = fetcher();
            Box::pin(async move {
                let value = fut.await?;
                serde_json::to_value(value).map_err(|e| {
                    ApiError::Validation(format!("Failed to encode fetched value: {}", e))
                })
            })
        });
        self.inner
            .fetchers
            .lock()
            .unwrap()
            .insert(key.clone(), erased.clone());

        self.run_fetch(key, erased, false).await
    }

    /// Mark `key` stale. With an active observer the refetch starts
    /// immediately in the background; without one it is deferred until the
    /// next `get_or_fetch`.
    pub fn invalidate(&self, key: &QueryKey) {
        let marked = {
            let mut entries = self.inner.entries.lock().unwrap();
            match entries.get_mut(key) {
                Some(entry) => {
                    entry.stale = true;
                    true
                }
                None => false,
            }
        };
        if !marked {
            return;
        }

        let observed = self
            .inner
            .observers
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .unwrap_or(0)
            > 0;
        if !observed {
            info!("Invalidated {} (no observers, refetch deferred)", key);
            return;
        }

        let fetcher = self.inner.fetchers.lock().unwrap().get(key).cloned();
        if let Some(fetcher) = fetcher {
            info!("Invalidated {}, refetching for active observers", key);
            let cache = self.clone();
            let key = key.clone();
            tokio::spawn(async move {
                cache.run_fetch(key, fetcher, true).await;
            });
        }
    }

    /// Write a value directly (optimistic updates). The entry becomes a
    /// fresh success as if it had just been fetched.
    pub fn set_value<T: Serialize>(&self, key: QueryKey, value: &T) -> Result<(), ApiError> {
        let value = serde_json::to_value(value)
            .map_err(|e| ApiError::Validation(format!("Failed to encode cache value: {}", e)))?;
        self.inner
            .entries
            .lock()
            .unwrap()
            .insert(key, CacheEntry::success(value, self.inner.ttl));
        Ok(())
    }

    /// Snapshot of the entry for `key` without triggering a fetch.
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.inner.entries.lock().unwrap().get(key).cloned()
    }

    /// Restore a previously peeked entry (mutation rollback). `None` removes
    /// the entry entirely.
    pub fn restore(&self, key: QueryKey, entry: Option<CacheEntry>) {
        let mut entries = self.inner.entries.lock().unwrap();
        match entry {
            Some(entry) => {
                entries.insert(key, entry);
            }
            None => {
                entries.remove(&key);
            }
        }
    }

    /// Drop every entry, registered fetcher, and in-flight fetch result.
    /// Called on logout so nothing cached for one user can leak to the next.
    pub fn clear(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.entries.lock().unwrap().clear();
        self.inner.fetchers.lock().unwrap().clear();
        self.inner.fetch_locks.lock().unwrap().clear();
        info!("Query cache cleared");
    }

    /// Register interest in a key. While the returned guard is alive,
    /// `invalidate` refetches the key immediately instead of deferring.
    pub fn observe(&self, key: QueryKey) -> QueryObserver {
        *self
            .inner
            .observers
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert(0) += 1;
        QueryObserver {
            cache: self.clone(),
            key,
        }
    }

    fn key_lock(&self, key: &QueryKey) -> Arc<tokio::sync::Mutex<()>> {
        self.inner
            .fetch_locks
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn run_fetch(&self, key: QueryKey, fetcher: BoxedFetcher, refresh_only: bool) -> CacheEntry {
        // Auth gating: protected resources sit idle while logged out.
        if key.requires_auth() && !self.inner.session.is_logged_in() {
            let entry = CacheEntry::idle();
            self.inner
                .entries
                .lock()
                .unwrap()
                .insert(key, entry.clone());
            return entry;
        }

        // Fast path: a fresh entry needs no lock and no network.
        if let Some(entry) = self.peek(&key) {
            if entry.is_fresh() {
                return entry;
            }
        }

        // One fetch per key: later callers park here and re-check.
        let lock = self.key_lock(&key);
        let _guard = lock.lock().await;

        match self.peek(&key) {
            Some(entry) if entry.is_fresh() => return entry,
            // Invalidation refetches coalesce: if an earlier holder of the
            // lock already serviced the staleness, skip the second fetch.
            Some(entry) if refresh_only && !entry.stale => return entry,
            None if refresh_only => return CacheEntry::idle(),
            _ => {}
        }

        let generation = self.inner.generation.load(Ordering::SeqCst);
        self.mark_loading(&key);
        info!("Fetching {}", key);
        let result = fetcher().await;

        if self.inner.generation.load(Ordering::SeqCst) != generation {
            warn!("Discarding fetch result for {} (cache cleared mid-flight)", key);
            return CacheEntry::idle();
        }

        let entry = match result {
            Ok(value) => CacheEntry::success(value, self.inner.ttl),
            Err(err) => {
                warn!("Fetch for {} failed: {}", key, err);
                self.failed_entry(&key, err)
            }
        };
        self.inner
            .entries
            .lock()
            .unwrap()
            .insert(key, entry.clone());
        entry
    }

    fn mark_loading(&self, key: &QueryKey) {
        let mut entries = self.inner.entries.lock().unwrap();
        let entry = entries.entry(key.clone()).or_insert_with(CacheEntry::idle);
        entry.status = QueryStatus::Loading;
        entry.error = None;
    }

    /// Build the error entry for a failed fetch, keeping any previous value.
    fn failed_entry(&self, key: &QueryKey, err: ApiError) -> CacheEntry {
        let previous = self.peek(key);
        let mut entry = previous.unwrap_or_else(CacheEntry::idle);
        entry.status = QueryStatus::Error;
        entry.error = Some(err);
        entry.stale = true;
        entry
    }
}

/// RAII guard for observer bookkeeping; dropping it releases interest.
/// A fetch already in flight when the guard drops still completes and still
/// updates the cache (other observers benefit), it just stops forcing
/// immediate refetches on invalidation.
pub struct QueryObserver {
    cache: QueryCache,
    key: QueryKey,
}

impl Drop for QueryObserver {
    fn drop(&mut self) {
        let mut observers = self.cache.inner.observers.lock().unwrap();
        if let Some(count) = observers.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                observers.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn logged_in_session() -> SessionHandle {
        let session = SessionHandle::new();
        session.set_logged_in(
            "tok".to_string(),
            crate::models::UserProfile {
                id: "u1".to_string(),
                first_name: "Ada".to_string(),
                last_name: "Green".to_string(),
                email: "ada@example.com".to_string(),
                notification_preferences: Default::default(),
            },
        );
        session
    }

    fn counting_fetcher(
        count: Arc<AtomicUsize>,
        value: &'static str,
        delay: Duration,
    ) -> impl Fn() -> BoxFuture<'static, Result<String, ApiError>> + Send + Sync + 'static {
        move || {
            let count = count.clone();
            Box::pin(async move {
                count.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                Ok(value.to_string())
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let fetcher = counting_fetcher(count.clone(), "plants", Duration::from_millis(50));
            handles.push(tokio::spawn(async move {
                cache.get_or_fetch(QueryKey::Plants, fetcher).await
            }));
        }

        for handle in handles {
            let entry = handle.await.unwrap();
            assert_eq!(entry.decode::<String>().unwrap().as_deref(), Some("plants"));
        }
        assert_eq!(count.load(Ordering::SeqCst), 1, "expected a single network call");
    }

    #[tokio::test]
    async fn test_fresh_entry_served_without_refetch() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));

        let fetcher = counting_fetcher(count.clone(), "v", Duration::ZERO);
        cache.get_or_fetch(QueryKey::Plants, fetcher).await;
        let fetcher = counting_fetcher(count.clone(), "v", Duration::ZERO);
        cache.get_or_fetch(QueryKey::Plants, fetcher).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_refetches() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::ZERO);
        let count = Arc::new(AtomicUsize::new(0));

        let fetcher = counting_fetcher(count.clone(), "v", Duration::ZERO);
        cache.get_or_fetch(QueryKey::Plants, fetcher).await;
        let fetcher = counting_fetcher(count.clone(), "v", Duration::ZERO);
        cache.get_or_fetch(QueryKey::Plants, fetcher).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_gated_key_is_idle_while_logged_out() {
        let session = SessionHandle::new();
        session.set_logged_out();
        let cache = QueryCache::new(session, Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));

        let fetcher = counting_fetcher(count.clone(), "v", Duration::ZERO);
        let entry = cache.get_or_fetch(QueryKey::MyPlants, fetcher).await;

        assert_eq!(entry.status, QueryStatus::Idle);
        assert!(entry.error.is_none(), "gated access is idle, not an error");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_error_is_stored_on_entry() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::from_secs(60));

        let entry = cache
            .get_or_fetch(QueryKey::Plants, || async {
                Err::<String, _>(ApiError::Server {
                    status: 500,
                    message: "boom".to_string(),
                })
            })
            .await;

        assert_eq!(entry.status, QueryStatus::Error);
        let err = entry.decode::<String>().unwrap_err();
        assert_eq!(err, ApiError::Server { status: 500, message: "boom".to_string() });
    }

    #[tokio::test]
    async fn test_failed_refetch_keeps_previous_value() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::ZERO);

        cache
            .get_or_fetch(QueryKey::Plants, || async { Ok("old".to_string()) })
            .await;
        let entry = cache
            .get_or_fetch(QueryKey::Plants, || async {
                Err::<String, _>(ApiError::Network("offline".to_string()))
            })
            .await;

        assert_eq!(entry.status, QueryStatus::Error);
        assert_eq!(
            entry.value,
            Some(serde_json::Value::String("old".to_string()))
        );
    }

    #[tokio::test]
    async fn test_invalidate_with_observer_refetches_once() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));

        let fetcher = counting_fetcher(count.clone(), "v", Duration::ZERO);
        cache.get_or_fetch(QueryKey::Plants, fetcher).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let _observer = cache.observe(QueryKey::Plants);
        // Back-to-back invalidations must coalesce into a single refetch.
        cache.invalidate(&QueryKey::Plants);
        cache.invalidate(&QueryKey::Plants);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(cache.peek(&QueryKey::Plants).unwrap().is_fresh());
    }

    #[tokio::test]
    async fn test_invalidate_without_observer_defers_refetch() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));

        let fetcher = counting_fetcher(count.clone(), "v", Duration::ZERO);
        cache.get_or_fetch(QueryKey::Plants, fetcher).await;
        cache.invalidate(&QueryKey::Plants);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1, "no eager refetch without observers");
        assert!(!cache.peek(&QueryKey::Plants).unwrap().is_fresh());

        // Next access refetches.
        let fetcher = counting_fetcher(count.clone(), "v", Duration::ZERO);
        cache.get_or_fetch(QueryKey::Plants, fetcher).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_clear_discards_in_flight_result() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));

        let slow = counting_fetcher(count.clone(), "previous-user", Duration::from_millis(80));
        let task = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.get_or_fetch(QueryKey::Plants, slow).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.clear();
        task.await.unwrap();

        assert!(
            cache.peek(&QueryKey::Plants).is_none(),
            "a fetch from before clear() must not repopulate the cache"
        );
    }

    #[tokio::test]
    async fn test_set_value_and_restore() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::from_secs(60));

        cache.set_value(QueryKey::Plants, &"optimistic".to_string()).unwrap();
        let snapshot = cache.peek(&QueryKey::Plants);
        assert!(snapshot.as_ref().unwrap().is_fresh());

        cache.set_value(QueryKey::Plants, &"newer".to_string()).unwrap();
        cache.restore(QueryKey::Plants, snapshot);
        let entry = cache.peek(&QueryKey::Plants).unwrap();
        assert_eq!(
            entry.decode::<String>().unwrap().as_deref(),
            Some("optimistic")
        );

        cache.restore(QueryKey::Plants, None);
        assert!(cache.peek(&QueryKey::Plants).is_none());
    }

    #[tokio::test]
    async fn test_observer_drop_releases_interest() {
        let cache = QueryCache::new(SessionHandle::new(), Duration::from_secs(60));
        let count = Arc::new(AtomicUsize::new(0));

        let fetcher = counting_fetcher(count.clone(), "v", Duration::ZERO);
        cache.get_or_fetch(QueryKey::Plants, fetcher).await;

        {
            let _observer = cache.observe(QueryKey::Plants);
        }
        cache.invalidate(&QueryKey::Plants);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1, "dropped observer must not force refetch");
    }
}
