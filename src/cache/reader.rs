//! Read-through cache with stale-while-revalidate refresh
//!
//! [`SwrCache::get`] resolves a key against two tiers, in order:
//!
//! 1. the in-process map, if its entry is fresh under the caller's TTL;
//! 2. the persistent store, if its entry is fresh under the TTL it was
//!    written with. The entry is promoted into memory, returned at once, and
//!    a detached task re-runs the loader to refresh both tiers;
//! 3. otherwise the loader is awaited and its result written to both tiers.
//!
//! Only a loader failure on the third path reaches the caller. Storage and
//! serialization problems degrade to misses.
//!
//! Concurrent cold misses for one key each run the loader unless
//! [`CacheConfig::single_flight`] is enabled.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::clock::{Clock, SystemClock};
use super::entry::CacheEntry;
use super::entry_store::{EntryStore, DEFAULT_NAMESPACE};
use super::store::PersistentStore;

/// Configuration for [`SwrCache`]
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Prefix for every key written to the persistent store
    pub namespace: String,
    /// Coalesce concurrent loads of the same key
    ///
    /// When enabled, concurrent cold misses queue on a per-key lock and the
    /// later callers reuse the value the first one loaded. At most one
    /// background refresh per key runs at a time.
    pub single_flight: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            single_flight: false,
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persistent key prefix.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Enable or disable load coalescing.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Served from the in-process tier
    pub memory_hits: u64,
    /// Served from the persistent tier (each one schedules a refresh)
    pub persisted_hits: u64,
    /// Had to await the loader
    pub misses: u64,
    /// Cold-miss loads whose loader failed
    pub loads_failed: u64,
    /// Background refreshes that stored a new value
    pub refreshes: u64,
    /// Background refreshes whose loader failed
    pub refreshes_failed: u64,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    persisted_hits: AtomicU64,
    misses: AtomicU64,
    loads_failed: AtomicU64,
    refreshes: AtomicU64,
    refreshes_failed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

struct Inner {
    memory: Mutex<HashMap<String, CacheEntry<Value>>>,
    entries: EntryStore,
    clock: Arc<dyn Clock>,
    single_flight: bool,
    load_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    refreshing: Mutex<HashSet<String>>,
    refresh_tasks: Mutex<Vec<JoinHandle<()>>>,
    counters: Counters,
}

/// A two-tier read-through cache
///
/// Cloning is cheap; clones share both tiers and the counters. Must be used
/// from within a tokio runtime, since persistent hits spawn a refresh task.
///
/// # Example
///
/// ```no_run
/// # use std::sync::Arc;
/// # use swrcache::cache::{CacheConfig, MemoryStore, SwrCache};
/// # async fn demo() -> Result<(), String> {
/// let cache = SwrCache::new(Arc::new(MemoryStore::new()), CacheConfig::default());
///
/// let latest: Vec<String> = cache
///     .get("home:latest", 5_000, || async { Ok::<_, String>(vec!["A".to_string()]) })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SwrCache {
    inner: Arc<Inner>,
}

impl SwrCache {
    /// Creates a cache over `store` using wall-clock time
    pub fn new(store: Arc<dyn PersistentStore>, config: CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Creates a cache over `store` using `clock` for freshness checks
    pub fn with_clock(
        store: Arc<dyn PersistentStore>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                memory: Mutex::new(HashMap::new()),
                entries: EntryStore::new(store, config.namespace),
                clock,
                single_flight: config.single_flight,
                load_locks: Mutex::new(HashMap::new()),
                refreshing: Mutex::new(HashSet::new()),
                refresh_tasks: Mutex::new(Vec::new()),
                counters: Counters::default(),
            }),
        }
    }

    /// The persistent tier
    pub fn entries(&self) -> &EntryStore {
        &self.inner.entries
    }

    /// Returns the value for `key`, loading it if neither tier has a fresh copy
    ///
    /// `ttl_ms` is the freshness window for the in-process tier and the TTL
    /// recorded on newly written entries. A `ttl_ms` of zero makes every call
    /// a cold miss.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when the loader had to be awaited (cold
    /// miss) and failed. Nothing is cached in that case.
    pub async fn get<T, E, F, Fut>(&self, key: &str, ttl_ms: u64, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        if let Some(value) = self.memory_hit(key, ttl_ms) {
            bump(&self.inner.counters.memory_hits);
            debug!(key, "in-process hit");
            return Ok(value);
        }

        if let Some(value) = self.promote_persisted::<T>(key) {
            bump(&self.inner.counters.persisted_hits);
            debug!(key, "persistent hit, refreshing in background");
            self.spawn_refresh(key, ttl_ms, loader);
            return Ok(value);
        }

        let _load_guard = if self.inner.single_flight {
            let guard = LoadGuard::acquire(&self.inner, key).await;
            if let Some(value) = self.memory_hit(key, ttl_ms) {
                bump(&self.inner.counters.memory_hits);
                debug!(key, "loaded by a concurrent caller");
                return Ok(value);
            }
            Some(guard)
        } else {
            None
        };

        bump(&self.inner.counters.misses);
        debug!(key, "cold miss, awaiting loader");
        match loader().await {
            Ok(value) => {
                self.store_fresh(key, ttl_ms, &value);
                Ok(value)
            }
            Err(e) => {
                bump(&self.inner.counters.loads_failed);
                debug!(key, error = %e, "loader failed on cold miss");
                Err(e)
            }
        }
    }

    /// Waits until every background refresh spawned so far has finished
    pub async fn wait_for_refreshes(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.inner.refresh_tasks.lock());
            if tasks.is_empty() {
                return;
            }
            for task in tasks {
                if let Err(e) = task.await {
                    warn!(error = %e, "background refresh task did not complete");
                }
            }
        }
    }

    /// Current counter values
    pub fn stats(&self) -> CacheStats {
        let c = &self.inner.counters;
        CacheStats {
            memory_hits: c.memory_hits.load(Ordering::Relaxed),
            persisted_hits: c.persisted_hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            loads_failed: c.loads_failed.load(Ordering::Relaxed),
            refreshes: c.refreshes.load(Ordering::Relaxed),
            refreshes_failed: c.refreshes_failed.load(Ordering::Relaxed),
        }
    }

    fn memory_hit<T: DeserializeOwned>(&self, key: &str, ttl_ms: u64) -> Option<T> {
        let now = self.inner.clock.now_ms();
        let memory = self.inner.memory.lock();
        let entry = memory.get(key)?;
        if !entry.is_fresh_within(now, ttl_ms) {
            return None;
        }
        match T::deserialize(&entry.value) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!(key, error = %e, "in-process entry has a different shape, ignoring");
                None
            }
        }
    }

    /// Copies a fresh persisted entry into memory and returns its value
    ///
    /// An in-process entry stored later than the persisted one is kept, so the
    /// in-process tier never moves back to older data.
    fn promote_persisted<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entry = self.inner.entries.read::<Value>(key)?;
        if !entry.is_fresh(self.inner.clock.now_ms()) {
            debug!(key, "persisted entry expired");
            return None;
        }
        let value = match T::deserialize(&entry.value) {
            Ok(value) => value,
            Err(e) => {
                debug!(key, error = %e, "persisted value has a different shape, treating as miss");
                return None;
            }
        };
        let mut memory = self.inner.memory.lock();
        match memory.get(key) {
            Some(current) if current.stored_at > entry.stored_at => {
                debug!(key, "in-process entry is newer than persisted, keeping it");
            }
            _ => {
                memory.insert(key.to_string(), entry);
            }
        }
        Some(value)
    }

    /// Replaces both tiers with a new entry stamped now
    ///
    /// Returns false if the value could not be converted to JSON and nothing
    /// was cached.
    fn store_fresh<T: Serialize>(&self, key: &str, ttl_ms: u64, value: &T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "loaded value is not JSON-serializable, not caching");
                return false;
            }
        };
        let entry = CacheEntry::new(value, self.inner.clock.now_ms(), ttl_ms);
        self.inner.entries.write(key, &entry);
        self.inner.memory.lock().insert(key.to_string(), entry);
        true
    }

    fn spawn_refresh<T, E, F, Fut>(&self, key: &str, ttl_ms: u64, loader: F)
    where
        T: Serialize + Send + 'static,
        E: Display + Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let claim = if self.inner.single_flight {
            match RefreshClaim::acquire(&self.inner, key) {
                Some(claim) => Some(claim),
                None => {
                    debug!(key, "refresh already in flight");
                    return;
                }
            }
        } else {
            None
        };

        let cache = self.clone();
        let key = key.to_string();
        let task = tokio::spawn(async move {
            let _claim = claim;
            match loader().await {
                Ok(value) => {
                    if cache.store_fresh(&key, ttl_ms, &value) {
                        bump(&cache.inner.counters.refreshes);
                        debug!(key = %key, "background refresh stored");
                    }
                }
                Err(e) => {
                    bump(&cache.inner.counters.refreshes_failed);
                    debug!(key = %key, error = %e, "background refresh failed, keeping cached value");
                }
            }
        });

        let mut tasks = self.inner.refresh_tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }
}

impl std::fmt::Debug for SwrCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwrCache")
            .field("entries", &self.inner.entries)
            .field("single_flight", &self.inner.single_flight)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Holds the per-key load lock; drops the lock's map entry when no one else needs it
struct LoadGuard {
    inner: Arc<Inner>,
    key: String,
    lock: Arc<tokio::sync::Mutex<()>>,
    _held: tokio::sync::OwnedMutexGuard<()>,
}

impl LoadGuard {
    async fn acquire(inner: &Arc<Inner>, key: &str) -> Self {
        let lock = inner
            .load_locks
            .lock()
            .entry(key.to_string())
            .or_default()
            .clone();
        let held = Arc::clone(&lock).lock_owned().await;
        Self {
            inner: Arc::clone(inner),
            key: key.to_string(),
            lock,
            _held: held,
        }
    }
}

impl Drop for LoadGuard {
    fn drop(&mut self) {
        let mut locks = self.inner.load_locks.lock();
        // The map, `self.lock` and the owned guard are the only references
        // unless another caller is waiting on this key.
        let unused = locks
            .get(&self.key)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) <= 3);
        if unused {
            locks.remove(&self.key);
        }
    }
}

/// Marks a key as having a refresh in flight until dropped
struct RefreshClaim {
    inner: Arc<Inner>,
    key: String,
}

impl RefreshClaim {
    fn acquire(inner: &Arc<Inner>, key: &str) -> Option<Self> {
        if !inner.refreshing.lock().insert(key.to_string()) {
            return None;
        }
        Some(Self {
            inner: Arc::clone(inner),
            key: key.to_string(),
        })
    }
}

impl Drop for RefreshClaim {
    fn drop(&mut self) {
        self.inner.refreshing.lock().remove(&self.key);
    }
}
