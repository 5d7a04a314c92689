//! Typed query cache with in-flight deduplication and stale marking.
//!
//! Values of any type live behind one [`QueryKey`] space. Invalidation only
//! marks entries stale: their data stays readable through
//! [`QueryCache::get_data`] until a [`QueryCache::fetch`] succeeds in
//! replacing it. Invalidating a key while it is being fetched makes the
//! fetched result stale too.

use crate::{
    error::{QueryError, Result},
    keys::{KeyFilter, QueryKey},
};
use moka::future::Cache;
use serde::Deserialize;
use snapgram_appwrite::AppwriteError;
use std::{
    any::Any,
    collections::HashMap,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::Duration,
};
use tracing::{debug, trace};

pub const ENV_PREFIX: &str = "SNAPGRAM_CACHE_";
pub const DEFAULT_MAX_CAPACITY: u64 = 1_000;
pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(5 * 60);

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct CacheConfig {
    pub max_capacity: u64,
    pub time_to_live: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: DEFAULT_MAX_CAPACITY,
            time_to_live: DEFAULT_TIME_TO_LIVE,
        }
    }
}

#[derive(Deserialize)]
struct CacheVars {
    max_capacity: Option<u64>,
    time_to_live_secs: Option<u64>,
}

impl From<CacheVars> for CacheConfig {
    fn from(vars: CacheVars) -> Self {
        Self {
            max_capacity: vars.max_capacity.unwrap_or(DEFAULT_MAX_CAPACITY),
            time_to_live: vars
                .time_to_live_secs
                .map_or(DEFAULT_TIME_TO_LIVE, Duration::from_secs),
        }
    }
}

impl CacheConfig {
    /// Reads `SNAPGRAM_CACHE_MAX_CAPACITY` and `SNAPGRAM_CACHE_TIME_TO_LIVE_SECS`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed(ENV_PREFIX).from_env::<CacheVars>().map(Into::into)
    }

    pub fn from_vars<I>(vars: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::prefixed(ENV_PREFIX)
            .from_iter::<_, CacheVars>(vars)
            .map(Into::into)
    }
}

struct CacheEntry {
    value: Arc<dyn Any + Send + Sync>,
    stale: AtomicBool,
}

impl CacheEntry {
    fn new(value: Arc<dyn Any + Send + Sync>, stale: bool) -> Self {
        Self {
            value,
            stale: AtomicBool::new(stale),
        }
    }

    fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    fn mark_stale(&self) {
        self.stale.store(true, Ordering::Release);
    }

    fn downcast<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Result<Arc<T>> {
        downcast(&self.value, key)
    }
}

fn downcast<T: Send + Sync + 'static>(
    value: &Arc<dyn Any + Send + Sync>,
    key: &QueryKey,
) -> Result<Arc<T>> {
    Arc::clone(value)
        .downcast::<T>()
        .map_err(|_| QueryError::DataType(key.clone()))
}

/// Result of a shared fetch, with the clock reading taken when it started.
struct Fetched {
    value: Arc<dyn Any + Send + Sync>,
    started: u64,
}

/// Writers of one key that have not stored their result yet.
struct Pending {
    /// Clock reading of the last invalidation matching the key. Results
    /// started before it are stored stale.
    invalidated_at: u64,
    writers: usize,
}

#[derive(Clone)]
pub struct QueryCache {
    entries: Cache<QueryKey, Arc<CacheEntry>>,
    /// Only used to share one fetch between concurrent readers of a key.
    in_flight: Cache<QueryKey, Arc<Fetched>>,
    pending: Arc<Mutex<HashMap<QueryKey, Pending>>>,
    /// Ticks on every invalidation and every fetch start.
    clock: Arc<AtomicU64>,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(config.time_to_live)
            .build();

        Self {
            entries,
            in_flight: Cache::new(config.max_capacity),
            pending: Arc::default(),
            clock: Arc::default(),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<QueryKey, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking invalidations of `key` for a write about to begin.
    fn register(&self, key: &QueryKey) {
        let now = self.clock.load(Ordering::SeqCst);
        self.pending()
            .entry(key.clone())
            .or_insert(Pending {
                invalidated_at: now,
                writers: 0,
            })
            .writers += 1;
    }

    /// Stops tracking `key` for one writer. Returns whether `key` was
    /// invalidated after `started`.
    async fn release(&self, key: &QueryKey, started: u64) -> bool {
        let (invalidated, last) = {
            let mut pending = self.pending();
            let Some(writer) = pending.get_mut(key) else {
                return false;
            };
            writer.writers -= 1;
            let invalidated = writer.invalidated_at > started;
            let last = writer.writers == 0;
            if last {
                pending.remove(key);
            }
            (invalidated, last)
        };

        if last {
            self.in_flight.invalidate(key).await;
        }
        invalidated
    }

    /// Stores a registered write. The entry is inserted before the check so
    /// that an invalidation racing the check either sees it or is seen.
    async fn store(
        &self,
        key: QueryKey,
        value: Arc<dyn Any + Send + Sync>,
        started: u64,
    ) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry::new(value, false));
        self.entries.insert(key.clone(), Arc::clone(&entry)).await;

        if self.release(&key, started).await {
            debug!(%key, "Invalidated while fetching, stored stale");
            entry.mark_stale();
        }
        entry
    }

    /// Returns fresh cached data for `key`, or awaits `fetch` and caches its
    /// result. Concurrent fetches of one key share a single run and its
    /// outcome; the other futures are dropped unpolled.
    ///
    /// Stale data is only replaced once the refetch succeeded. Errors are not
    /// cached. A result is stored stale when the key was invalidated while it
    /// was being fetched.
    pub async fn fetch<T, Fut>(&self, key: QueryKey, fetch: Fut) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppwriteError>>,
    {
        if let Some(entry) = self.entries.get(&key).await
            && !entry.is_stale()
        {
            trace!(%key, "Cache hit");
            return entry.downcast(&key);
        }

        debug!(%key, "Fetching");
        self.register(&key);
        let fetched = self
            .in_flight
            .try_get_with(key.clone(), async {
                let started = self.tick();
                let value = fetch.await?;
                Ok::<_, AppwriteError>(Arc::new(Fetched {
                    value: Arc::new(value),
                    started,
                }))
            })
            .await;

        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(err) => {
                self.release(&key, u64::MAX).await;
                return Err(err.into());
            }
        };

        let entry = self
            .store(key.clone(), Arc::clone(&fetched.value), fetched.started)
            .await;
        entry.downcast(&key)
    }

    /// Awaits `update` and stores its result under `key`, stale when the key
    /// was invalidated meanwhile. Not deduplicated.
    pub async fn update<T, Fut>(&self, key: QueryKey, update: Fut) -> Result<Arc<T>>
    where
        T: Send + Sync + 'static,
        Fut: Future<Output = Result<T, AppwriteError>>,
    {
        self.register(&key);
        let started = self.tick();

        let value = match update.await {
            Ok(value) => Arc::new(value),
            Err(err) => {
                self.release(&key, u64::MAX).await;
                return Err(err.into());
            }
        };

        self.store(key, Arc::clone(&value) as Arc<dyn Any + Send + Sync>, started)
            .await;
        Ok(value)
    }

    /// The cached data for `key`, stale or not.
    pub async fn get_data<T: Send + Sync + 'static>(&self, key: &QueryKey) -> Option<Arc<T>> {
        let entry = self.entries.get(key).await?;
        entry.downcast(key).ok()
    }

    /// Stores `value` as fresh data for `key`.
    pub async fn set_data<T: Send + Sync + 'static>(&self, key: QueryKey, value: T) -> Arc<T> {
        let value = Arc::new(value);
        let entry = CacheEntry::new(Arc::clone(&value) as Arc<dyn Any + Send + Sync>, false);
        self.entries.insert(key, Arc::new(entry)).await;
        value
    }

    /// Marks every entry and every running fetch matched by one of `filters`
    /// stale. Returns how many were marked.
    pub fn invalidate(&self, filters: &[KeyFilter]) -> usize {
        let matches = |key: &QueryKey| filters.iter().any(|filter| filter.matches(key));
        let now = self.tick();
        let mut marked = 0;

        // Running fetches first: a result stored after this loop is either
        // seen by the entry walk below or checks the bumped reading itself.
        for (key, pending) in self.pending().iter_mut() {
            if matches(key) {
                pending.invalidated_at = now;
                marked += 1;
            }
        }

        for (key, entry) in self.entries.iter() {
            if matches(&key) && !entry.is_stale() {
                entry.mark_stale();
                marked += 1;
            }
        }

        debug!(?filters, marked, "Invalidated queries");
        marked
    }

    /// Whether `key` holds data that will be refetched on the next read.
    pub async fn is_stale(&self, key: &QueryKey) -> bool {
        self.entries
            .get(key)
            .await
            .is_some_and(|entry| entry.is_stale())
    }

    pub async fn contains(&self, key: &QueryKey) -> bool {
        self.entries.get(key).await.is_some()
    }

    pub async fn remove(&self, key: &QueryKey) {
        self.entries.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cache::{CacheConfig, DEFAULT_MAX_CAPACITY, DEFAULT_TIME_TO_LIVE, QueryCache},
        error::QueryError,
        keys::{KeyFilter, QueryKey, QueryTag},
    };
    use snapgram_appwrite::AppwriteError;
    use snapgram_common::model::Id;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::sync::Notify;

    fn cache() -> QueryCache {
        QueryCache::new(&CacheConfig::default())
    }

    #[test]
    fn config_defaults_and_overrides() {
        let defaults = CacheConfig::from_vars(Vec::new()).unwrap();
        assert_eq!(defaults.max_capacity, DEFAULT_MAX_CAPACITY);
        assert_eq!(defaults.time_to_live, DEFAULT_TIME_TO_LIVE);

        let config = CacheConfig::from_vars(vec![
            ("SNAPGRAM_CACHE_MAX_CAPACITY".to_owned(), "10".to_owned()),
            ("SNAPGRAM_CACHE_TIME_TO_LIVE_SECS".to_owned(), "30".to_owned()),
        ])
        .unwrap();
        assert_eq!(config.max_capacity, 10);
        assert_eq!(config.time_to_live, Duration::from_secs(30));

        assert!(
            CacheConfig::from_vars(vec![(
                "SNAPGRAM_CACHE_MAX_CAPACITY".to_owned(),
                "lots".to_owned()
            )])
            .is_err()
        );
    }

    #[tokio::test]
    async fn fresh_entries_are_not_refetched() {
        let cache = cache();
        let runs = &AtomicUsize::new(0);
        let fetcher = move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            Ok::<_, AppwriteError>(42_u32)
        };

        let first = cache.fetch(QueryKey::RecentPosts, fetcher()).await.unwrap();
        let second = cache.fetch(QueryKey::RecentPosts, fetcher()).await.unwrap();

        assert_eq!((*first, *second), (42, 42));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_fetches_share_one_run() {
        let cache = cache();
        let runs = &AtomicUsize::new(0);
        let fetcher = move || async move {
            runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<_, AppwriteError>("posts".to_owned())
        };

        let (a, b, c) = tokio::join!(
            cache.fetch(QueryKey::InfinitePosts, fetcher()),
            cache.fetch(QueryKey::InfinitePosts, fetcher()),
            cache.fetch(QueryKey::InfinitePosts, fetcher()),
        );

        assert_eq!(a.unwrap().as_str(), "posts");
        assert_eq!(b.unwrap().as_str(), "posts");
        assert_eq!(c.unwrap().as_str(), "posts");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_entries_are_refetched() {
        let cache = cache();
        let runs = &AtomicUsize::new(0);
        let fetcher =
            move || async move { Ok::<_, AppwriteError>(runs.fetch_add(1, Ordering::SeqCst)) };
        let key = QueryKey::PostById(Id::new("p1"));

        assert_eq!(*cache.fetch(key.clone(), fetcher()).await.unwrap(), 0);

        let marked = cache.invalidate(&[KeyFilter::Tag(QueryTag::PostById)]);
        assert_eq!(marked, 1);
        assert!(cache.is_stale(&key).await);
        // Stale data stays readable.
        assert_eq!(cache.get_data::<usize>(&key).await.as_deref(), Some(&0));

        assert_eq!(*cache.fetch(key.clone(), fetcher()).await.unwrap(), 1);
        assert!(!cache.is_stale(&key).await);
    }

    #[tokio::test]
    async fn invalidation_respects_filters() {
        let cache = cache();
        cache.set_data(QueryKey::PostById(Id::new("p1")), 1_u8).await;
        cache.set_data(QueryKey::PostById(Id::new("p2")), 2_u8).await;
        cache.set_data(QueryKey::CurrentUser, 3_u8).await;

        let marked = cache.invalidate(&[KeyFilter::Exact(QueryKey::PostById(Id::new("p1")))]);

        assert_eq!(marked, 1);
        assert!(cache.is_stale(&QueryKey::PostById(Id::new("p1"))).await);
        assert!(!cache.is_stale(&QueryKey::PostById(Id::new("p2"))).await);
        assert!(!cache.is_stale(&QueryKey::CurrentUser).await);
    }

    #[tokio::test]
    async fn errors_are_shared_and_not_cached() {
        let cache = cache();

        let error = cache
            .fetch(QueryKey::CurrentUser, async {
                Err::<u8, _>(AppwriteError::EmptyId)
            })
            .await
            .unwrap_err();
        assert!(matches!(error, QueryError::Remote(ref err) if matches!(**err, AppwriteError::EmptyId)));
        assert!(!cache.contains(&QueryKey::CurrentUser).await);

        let value = cache
            .fetch(QueryKey::CurrentUser, async { Ok::<_, AppwriteError>(7_u8) })
            .await
            .unwrap();
        assert_eq!(*value, 7);
    }

    #[tokio::test]
    async fn type_mismatch_is_an_error() {
        let cache = cache();
        cache.set_data(QueryKey::RecentPosts, "text".to_owned()).await;

        let error = cache
            .fetch(QueryKey::RecentPosts, async { Ok::<_, AppwriteError>(1_u8) })
            .await
            .unwrap_err();

        assert!(matches!(error, QueryError::DataType(QueryKey::RecentPosts)));
        assert!(cache.get_data::<u8>(&QueryKey::RecentPosts).await.is_none());
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let cache = cache();
        cache.set_data(QueryKey::RecentPosts, 1_u8).await;
        cache.set_data(QueryKey::CurrentUser, 2_u8).await;

        cache.remove(&QueryKey::RecentPosts).await;
        assert!(!cache.contains(&QueryKey::RecentPosts).await);
        assert!(cache.contains(&QueryKey::CurrentUser).await);

        cache.clear();
        assert!(!cache.contains(&QueryKey::CurrentUser).await);
    }

    #[tokio::test]
    async fn invalidation_during_fetch_is_kept() {
        let cache = cache();
        let key = QueryKey::PostById(Id::new("p1"));
        let (started, release) = (Notify::new(), Notify::new());

        let fetching = cache.fetch(key.clone(), async {
            started.notify_one();
            release.notified().await;
            Ok::<_, AppwriteError>(1_u8)
        });
        let invalidating = async {
            started.notified().await;
            let marked = cache.invalidate(&[KeyFilter::Tag(QueryTag::PostById)]);
            release.notify_one();
            marked
        };
        let (fetched, marked) = tokio::join!(fetching, invalidating);

        assert_eq!(*fetched.unwrap(), 1);
        assert_eq!(marked, 1);
        assert!(cache.is_stale(&key).await);

        let refetched = cache
            .fetch(key.clone(), async { Ok::<_, AppwriteError>(2_u8) })
            .await
            .unwrap();
        assert_eq!(*refetched, 2);
        assert!(!cache.is_stale(&key).await);
    }

    #[tokio::test]
    async fn unrelated_invalidation_during_fetch_is_ignored() {
        let cache = cache();
        let key = QueryKey::PostById(Id::new("p1"));
        let (started, release) = (Notify::new(), Notify::new());

        let fetching = cache.fetch(key.clone(), async {
            started.notify_one();
            release.notified().await;
            Ok::<_, AppwriteError>(1_u8)
        });
        let invalidating = async {
            started.notified().await;
            cache.invalidate(&[KeyFilter::Exact(QueryKey::PostById(Id::new("p2")))]);
            release.notify_one();
        };
        let (fetched, ()) = tokio::join!(fetching, invalidating);

        assert_eq!(*fetched.unwrap(), 1);
        assert!(!cache.is_stale(&key).await);
    }

    #[tokio::test]
    async fn invalidation_during_update_is_kept() {
        let cache = cache();
        cache.set_data(QueryKey::InfinitePosts, 1_u8).await;
        let (started, release) = (Notify::new(), Notify::new());

        let updating = cache.update(QueryKey::InfinitePosts, async {
            started.notify_one();
            release.notified().await;
            Ok::<_, AppwriteError>(2_u8)
        });
        let invalidating = async {
            started.notified().await;
            cache.invalidate(&[KeyFilter::Tag(QueryTag::InfinitePosts)]);
            release.notify_one();
        };
        let (updated, ()) = tokio::join!(updating, invalidating);

        assert_eq!(*updated.unwrap(), 2);
        assert!(cache.is_stale(&QueryKey::InfinitePosts).await);
        assert_eq!(
            cache.get_data::<u8>(&QueryKey::InfinitePosts).await.as_deref(),
            Some(&2)
        );
    }

    #[tokio::test]
    async fn failed_refetch_keeps_stale_data() {
        let cache = cache();
        cache.set_data(QueryKey::RecentPosts, 7_u8).await;
        cache.invalidate(&[KeyFilter::Tag(QueryTag::RecentPosts)]);

        let result = cache
            .fetch(QueryKey::RecentPosts, async {
                Err::<u8, _>(AppwriteError::EmptyId)
            })
            .await;

        assert!(result.is_err());
        assert_eq!(
            cache.get_data::<u8>(&QueryKey::RecentPosts).await.as_deref(),
            Some(&7)
        );
        assert!(cache.is_stale(&QueryKey::RecentPosts).await);

        let refetched = cache
            .fetch(QueryKey::RecentPosts, async { Ok::<_, AppwriteError>(8_u8) })
            .await
            .unwrap();
        assert_eq!(*refetched, 8);
        assert!(!cache.is_stale(&QueryKey::RecentPosts).await);
    }

    #[tokio::test]
    async fn failed_update_keeps_data() {
        let cache = cache();
        cache.set_data(QueryKey::InfinitePosts, 1_u8).await;

        let result = cache
            .update(QueryKey::InfinitePosts, async {
                Err::<u8, _>(AppwriteError::EmptyId)
            })
            .await;

        assert!(result.is_err());
        assert_eq!(
            cache.get_data::<u8>(&QueryKey::InfinitePosts).await.as_deref(),
            Some(&1)
        );
    }
}
