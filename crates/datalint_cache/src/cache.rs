//! Memoizing cache for inspection outcomes.
//!
//! Entries are keyed by the artifact's content fingerprint plus the task's
//! [`CheckProfile`], so the same bytes under a different path share an entry
//! while two check sets over the same bytes are cached independently.
//!
//! Concurrent misses on one key collapse into a single computation: the first
//! caller becomes the leader and publishes its result on a `watch` channel
//! that later callers wait on. State sits behind one mutex that is never held
//! across an await point.
//!
//! Entries live in an [`LruCache`]. Under the LRU policy a hit promotes the
//! entry; under the TTL policy hits only peek, so the map keeps insertion
//! order and capacity evictions drop the oldest insert.

use crate::fingerprint::fingerprint_artifact;
use crate::snapshot::{Snapshot, SnapshotEntry};
use chrono::{DateTime, Utc};
use datalint_core::{
    CacheConfig, CheckProfile, DatalintError, DatasetTask, EvictionPolicy, Fingerprint,
    InspectionOutcome, Result,
};
use datalint_validator::{FileStamp, Inspect, InspectionContext, Inspector};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type Shared = std::result::Result<Arc<InspectionOutcome>, DatalintError>;

/// Identity of a cached outcome.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Content fingerprint of the artifact
    pub fingerprint: Fingerprint,
    /// Outcome-relevant part of the task
    pub profile: CheckProfile,
}

#[derive(Debug)]
struct CacheEntry {
    outcome: Arc<InspectionOutcome>,
    cached_at: DateTime<Utc>,
}

struct CacheState {
    /// Unbounded so that large capacities are not preallocated; the cache
    /// trims it to `capacity` after every insert.
    entries: LruCache<CacheKey, CacheEntry>,
    in_flight: HashMap<CacheKey, watch::Receiver<Option<Shared>>>,
}

impl CacheState {
    fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            in_flight: HashMap::new(),
        }
    }
}

/// Counters describing cache behaviour since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from a stored entry
    pub hits: u64,
    /// Lookups that started a computation
    pub misses: u64,
    /// Computations that ran to completion
    pub computations: u64,
    /// Lookups that waited on another caller's computation
    pub coalesced: u64,
    /// Entries dropped for capacity
    pub evictions: u64,
    /// Entries dropped for age
    pub expirations: u64,
    /// Requests served without touching the cache state
    pub bypasses: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    coalesced: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    bypasses: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
        }
    }
}

enum Claim {
    Hit(Arc<InspectionOutcome>),
    Wait(watch::Receiver<Option<Shared>>),
    Lead(watch::Sender<Option<Shared>>),
    Bypass,
}

/// Result cache in front of an [`Inspect`] implementation.
///
/// The cache is an explicit handle owned by the caller; share it with
/// `Arc<Cache>` across tasks.
///
/// # Example
///
/// ```rust
/// use datalint_cache::Cache;
/// use datalint_core::{Artifact, CacheConfig, DatasetTask};
///
/// let runtime = tokio::runtime::Runtime::new().unwrap();
/// let cache = Cache::new(CacheConfig::builder().capacity(16).build().unwrap()).unwrap();
/// let task = DatasetTask::new(Artifact::bytes("people.csv", "id,name\n1,ada\n"));
///
/// let first = runtime.block_on(cache.get_or_compute(&task)).unwrap();
/// let second = runtime.block_on(cache.get_or_compute(&task)).unwrap();
/// assert_eq!(first, second);
/// assert_eq!(cache.stats().computations, 1);
/// ```
pub struct Cache<I: Inspect = Inspector> {
    config: CacheConfig,
    inspector: Arc<I>,
    state: Mutex<CacheState>,
    counters: Counters,
}

impl Cache<Inspector> {
    /// Creates a cache around the default inspector.
    ///
    /// Loads the snapshot at `persist_path` when one exists.
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_inspector(config, Inspector::new())
    }
}

impl<I: Inspect> Cache<I> {
    /// Creates a cache around a custom inspector.
    pub fn with_inspector(config: CacheConfig, inspector: I) -> Result<Self> {
        config.validate()?;
        let cache = Self {
            config,
            inspector: Arc::new(inspector),
            state: Mutex::new(CacheState::new()),
            counters: Counters::default(),
        };
        cache.load_snapshot();
        Ok(cache)
    }

    /// Configuration the cache was created with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    fn lock(&self) -> Option<MutexGuard<'_, CacheState>> {
        match self.state.lock() {
            Ok(guard) => Some(guard),
            Err(_) => {
                warn!("cache state lock is poisoned, bypassing the cache");
                Counters::bump(&self.counters.bypasses);
                None
            }
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.entries.len()).unwrap_or(0)
    }

    /// Returns true when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every stored entry. In-flight computations are unaffected.
    pub fn clear(&self) {
        if let Some(mut state) = self.lock() {
            state.entries.clear();
            debug!("cache cleared");
        }
    }

    /// Drops every entry for a fingerprint, whatever its check profile.
    /// Returns the number of entries removed.
    pub fn invalidate(&self, fingerprint: &Fingerprint) -> usize {
        let Some(mut state) = self.lock() else {
            return 0;
        };
        let keys: Vec<CacheKey> = state
            .entries
            .iter()
            .map(|(key, _)| key)
            .filter(|key| &key.fingerprint == fingerprint)
            .cloned()
            .collect();
        for key in &keys {
            state.entries.pop(key);
        }
        debug!(fingerprint = %fingerprint, removed = keys.len(), "invalidated entries");
        keys.len()
    }

    fn is_expired(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match self.config.eviction_policy.ttl() {
            Some(ttl) => (now - entry.cached_at)
                .to_std()
                .is_ok_and(|age| age >= ttl),
            None => false,
        }
    }

    fn claim(&self, key: &CacheKey) -> Claim {
        let Some(mut guard) = self.lock() else {
            return Claim::Bypass;
        };
        let state = &mut *guard;
        let now = Utc::now();

        let expired = state.entries.peek(key).map(|e| self.is_expired(e, now));
        match expired {
            Some(true) => {
                state.entries.pop(key);
                Counters::bump(&self.counters.expirations);
                debug!(fingerprint = %key.fingerprint, "cache entry expired");
            }
            Some(false) => {
                let entry = match self.config.eviction_policy {
                    EvictionPolicy::Lru => state.entries.get(key),
                    EvictionPolicy::Ttl { .. } => state.entries.peek(key),
                };
                let Some(entry) = entry else {
                    return Claim::Bypass;
                };
                let outcome = Arc::clone(&entry.outcome);
                Counters::bump(&self.counters.hits);
                debug!(fingerprint = %key.fingerprint, "cache hit");
                return Claim::Hit(outcome);
            }
            None => {}
        }

        if let Some(rx) = state.in_flight.get(key) {
            Counters::bump(&self.counters.coalesced);
            return Claim::Wait(rx.clone());
        }

        Counters::bump(&self.counters.misses);
        debug!(fingerprint = %key.fingerprint, "cache miss");
        let (tx, rx) = watch::channel(None);
        state.in_flight.insert(key.clone(), rx);
        Claim::Lead(tx)
    }

    fn insert_locked(
        &self,
        state: &mut CacheState,
        key: CacheKey,
        outcome: Arc<InspectionOutcome>,
        cached_at: DateTime<Utc>,
    ) {
        // A re-inserted key moves to the most recent end.
        state.entries.pop(&key);
        state.entries.put(key, CacheEntry { outcome, cached_at });

        while state.entries.len() > self.config.capacity {
            let Some((oldest, _)) = state.entries.pop_lru() else {
                break;
            };
            Counters::bump(&self.counters.evictions);
            debug!(fingerprint = %oldest.fingerprint, "evicted cache entry");
        }
    }

    /// Stores (or skips) the leader's result and retires the in-flight slot.
    fn finish(&self, key: &CacheKey, store: Option<Arc<InspectionOutcome>>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.in_flight.remove(key);
        if let Some(outcome) = store {
            self.insert_locked(&mut state, key.clone(), outcome, Utc::now());
        }
    }

    /// Returns the cached outcome for a task, computing it on a miss.
    pub async fn get_or_compute(&self, task: &DatasetTask) -> Result<Arc<InspectionOutcome>> {
        self.get_or_compute_cancellable(task, CancellationToken::new())
            .await
    }

    /// Like [`get_or_compute`](Self::get_or_compute), aborting with
    /// [`DatalintError::Cancelled`] once `cancel` fires.
    ///
    /// A cancelled or timed-out computation stores nothing.
    pub async fn get_or_compute_cancellable(
        &self,
        task: &DatasetTask,
        cancel: CancellationToken,
    ) -> Result<Arc<InspectionOutcome>> {
        let stamp = FileStamp::of(task.artifact())?;
        let algorithm = self.config.fingerprint_algorithm;
        let fingerprint = self
            .run_blocking(task, &cancel, move |task, ctx| {
                fingerprint_artifact(task.artifact(), algorithm, ctx)
            })
            .await?;
        let key = CacheKey {
            fingerprint,
            profile: task.check_profile(),
        };

        loop {
            match self.claim(&key) {
                Claim::Hit(outcome) => return Ok(outcome),
                Claim::Bypass => {
                    let outcome = self.compute(task, &key.fingerprint, &cancel).await?;
                    return Ok(Arc::new(outcome));
                }
                Claim::Wait(mut rx) => {
                    let shared = tokio::select! {
                        _ = cancel.cancelled() => return Err(DatalintError::Cancelled),
                        waited = rx.wait_for(Option::is_some) => match waited {
                            Ok(value) => value.clone(),
                            // The leader went away without a result.
                            Err(_) => None,
                        },
                    };
                    match shared {
                        Some(Ok(outcome)) => return Ok(outcome),
                        Some(Err(DatalintError::Cancelled)) | None => continue,
                        Some(Err(e)) => return Err(e),
                    }
                }
                Claim::Lead(tx) => {
                    let flight = Flight {
                        cache: self,
                        key: &key,
                        sender: Some(tx),
                    };
                    return self.lead(task, &key, stamp, &cancel, flight).await;
                }
            }
        }
    }

    async fn lead(
        &self,
        task: &DatasetTask,
        key: &CacheKey,
        stamp: Option<FileStamp>,
        cancel: &CancellationToken,
        mut flight: Flight<'_, I>,
    ) -> Result<Arc<InspectionOutcome>> {
        match self.compute(task, &key.fingerprint, cancel).await {
            Ok(outcome) => {
                let outcome = Arc::new(outcome);
                let unchanged = match stamp {
                    Some(before) => FileStamp::of(task.artifact())
                        .is_ok_and(|after| after == Some(before)),
                    None => true,
                };
                if !unchanged {
                    warn!(
                        artifact = %task.artifact().display_name(),
                        "artifact changed during inspection, result not cached"
                    );
                }
                let store = unchanged.then(|| Arc::clone(&outcome));
                flight.complete(Ok(Arc::clone(&outcome)), store);
                Ok(outcome)
            }
            // Dropping the flight wakes waiters, which retry.
            Err(DatalintError::Cancelled) => Err(DatalintError::Cancelled),
            Err(e) => {
                flight.complete(Err(e.clone()), None);
                Err(e)
            }
        }
    }

    async fn compute(
        &self,
        task: &DatasetTask,
        fingerprint: &Fingerprint,
        cancel: &CancellationToken,
    ) -> Result<InspectionOutcome> {
        let inspector = Arc::clone(&self.inspector);
        let mut outcome = self
            .run_blocking(task, cancel, move |task, ctx| inspector.inspect(task, ctx))
            .await?;
        Counters::bump(&self.counters.computations);
        outcome.fingerprint = Some(fingerprint.clone());
        Ok(outcome)
    }

    /// Runs blocking work on the blocking pool, bounded by the task timeout
    /// and tied to `cancel`.
    async fn run_blocking<T, F>(
        &self,
        task: &DatasetTask,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&DatasetTask, &InspectionContext) -> Result<T> + Send + 'static,
    {
        let ctx = InspectionContext::with_cancellation(cancel.child_token());
        let token = ctx.token().clone();
        let owned = task.clone();
        let timeout = task.options().timeout();
        let handle = tokio::task::spawn_blocking(move || work(&owned, &ctx));

        tokio::select! {
            _ = cancel.cancelled() => {
                token.cancel();
                Err(DatalintError::Cancelled)
            }
            joined = tokio::time::timeout(timeout, handle) => match joined {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!(error = %e, "inspection task failed to join, result not cached");
                    Counters::bump(&self.counters.bypasses);
                    Err(DatalintError::internal(format!("inspection task failed: {}", e)))
                }
                Err(_) => {
                    token.cancel();
                    warn!(
                        artifact = %task.artifact().display_name(),
                        timeout_ms = timeout.as_millis() as u64,
                        "inspection timed out"
                    );
                    Err(DatalintError::timeout(task.artifact().display_name(), timeout))
                }
            },
        }
    }

    /// Writes a JSON snapshot of every stored entry to `persist_path`.
    ///
    /// Returns the number of entries written.
    pub fn persist(&self) -> Result<usize> {
        let Some(path) = self.config.persist_path.as_ref() else {
            return Err(DatalintError::snapshot("no persist path configured"));
        };

        let entries: Vec<SnapshotEntry> = {
            let state = self
                .lock()
                .ok_or_else(|| DatalintError::internal("cache state lock is poisoned"))?;
            // Oldest first, so a reload rebuilds the same order.
            state
                .entries
                .iter()
                .rev()
                .map(|(key, entry)| SnapshotEntry {
                    key: key.clone(),
                    outcome: (*entry.outcome).clone(),
                    cached_at: entry.cached_at,
                })
                .collect()
        };

        let count = entries.len();
        Snapshot::new(entries).write(path)?;
        info!(path = %path.display(), entries = count, "cache snapshot written");
        Ok(count)
    }

    fn load_snapshot(&self) {
        let Some(path) = self.config.persist_path.as_ref() else {
            return;
        };
        if !path.exists() {
            return;
        }

        let snapshot = match Snapshot::read(path) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable cache snapshot");
                return;
            }
        };
        if !snapshot.is_current() {
            warn!(
                path = %path.display(),
                snapshot_version = %snapshot.engine_version,
                "ignoring cache snapshot from another engine version"
            );
            return;
        }

        let Some(mut state) = self.lock() else {
            return;
        };
        let now = Utc::now();
        let mut loaded = 0usize;
        for entry in snapshot.entries {
            let candidate = CacheEntry {
                outcome: Arc::new(entry.outcome),
                cached_at: entry.cached_at,
            };
            if self.is_expired(&candidate, now) {
                continue;
            }
            self.insert_locked(&mut state, entry.key, candidate.outcome, entry.cached_at);
            loaded += 1;
        }
        info!(path = %path.display(), entries = loaded, "cache snapshot loaded");
    }
}

/// The leader's claim on an in-flight key.
///
/// Dropped without completing (cancellation, a dropped future), it frees the
/// key so that a waiting caller can take over.
struct Flight<'a, I: Inspect> {
    cache: &'a Cache<I>,
    key: &'a CacheKey,
    sender: Option<watch::Sender<Option<Shared>>>,
}

impl<I: Inspect> Flight<'_, I> {
    fn complete(&mut self, shared: Shared, store: Option<Arc<InspectionOutcome>>) {
        self.cache.finish(self.key, store);
        if let Some(sender) = self.sender.take() {
            // No receivers left is fine.
            let _ = sender.send(Some(shared));
        }
    }
}

impl<I: Inspect> Drop for Flight<'_, I> {
    fn drop(&mut self) {
        if self.sender.is_some() {
            self.cache.finish(self.key, None);
        }
    }
}

#[cfg(test)]
impl<I: Inspect> Cache<I> {
    fn poison(&self) {
        let state = &self.state;
        let _ = std::thread::scope(|scope| {
            scope
                .spawn(|| {
                    let _guard = state.lock();
                    panic!("poison the cache state");
                })
                .join()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalint_core::{Artifact, Check};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const TTL_STEP: Duration = Duration::from_millis(250);

    fn csv(i: usize) -> DatasetTask {
        DatasetTask::new(Artifact::bytes(
            format!("t{}.csv", i),
            format!("id,value\n{},{}\n", i, i * 10),
        ))
    }

    fn cache(capacity: usize) -> Cache {
        Cache::new(CacheConfig::builder().capacity(capacity).build().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_hit_after_miss() {
        let cache = cache(8);
        let a = cache.get_or_compute(&csv(1)).await.unwrap();
        let b = cache.get_or_compute(&csv(1)).await.unwrap();
        assert_eq!(a, b);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.computations, 1);
        assert!(a.fingerprint.is_some());
    }

    #[tokio::test]
    async fn test_same_bytes_different_name_share_entry() {
        let cache = cache(8);
        let a = DatasetTask::new(Artifact::bytes("a.csv", "x,y\n1,2\n"));
        let b = DatasetTask::new(Artifact::bytes("b.csv", "x,y\n1,2\n"));
        cache.get_or_compute(&a).await.unwrap();
        cache.get_or_compute(&b).await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().computations, 1);
    }

    #[tokio::test]
    async fn test_check_sets_are_cached_independently() {
        let cache = cache(8);
        let artifact = Artifact::bytes("a.csv", "x,y\n1,2\n");
        let structure = DatasetTask::builder(artifact.clone())
            .check(Check::Structure)
            .build();
        let detect = DatasetTask::builder(artifact)
            .check(Check::DetectFormat)
            .build();
        cache.get_or_compute(&structure).await.unwrap();
        cache.get_or_compute(&detect).await.unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let cache = cache(2);
        cache.get_or_compute(&csv(1)).await.unwrap();
        cache.get_or_compute(&csv(2)).await.unwrap();
        // Touch 1 so that 2 becomes least recently used.
        cache.get_or_compute(&csv(1)).await.unwrap();
        cache.get_or_compute(&csv(3)).await.unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 1);

        let before = cache.stats().misses;
        cache.get_or_compute(&csv(2)).await.unwrap();
        assert_eq!(cache.stats().misses, before + 1);

        let hits = cache.stats().hits;
        cache.get_or_compute(&csv(3)).await.unwrap();
        assert_eq!(cache.stats().hits, hits + 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = Cache::new(
            CacheConfig::builder()
                .capacity(8)
                .ttl(TTL_STEP)
                .build()
                .unwrap(),
        )
        .unwrap();
        cache.get_or_compute(&csv(1)).await.unwrap();
        cache.get_or_compute(&csv(1)).await.unwrap();
        assert_eq!(cache.stats().hits, 1);

        tokio::time::sleep(TTL_STEP * 3).await;
        cache.get_or_compute(&csv(1)).await.unwrap();
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.computations, 2);
    }

    #[tokio::test]
    async fn test_ttl_policy_evicts_oldest_insert() {
        let cache = Cache::new(
            CacheConfig::builder()
                .capacity(2)
                .ttl(Duration::from_secs(600))
                .build()
                .unwrap(),
        )
        .unwrap();
        cache.get_or_compute(&csv(1)).await.unwrap();
        cache.get_or_compute(&csv(2)).await.unwrap();
        // A hit does not refresh insertion order.
        cache.get_or_compute(&csv(1)).await.unwrap();
        cache.get_or_compute(&csv(3)).await.unwrap();
        assert_eq!(cache.stats().evictions, 1);

        let hits = cache.stats().hits;
        cache.get_or_compute(&csv(2)).await.unwrap();
        assert_eq!(cache.stats().hits, hits + 1);

        let misses = cache.stats().misses;
        cache.get_or_compute(&csv(1)).await.unwrap();
        assert_eq!(cache.stats().misses, misses + 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let cache = cache(8);
        let outcome = cache.get_or_compute(&csv(1)).await.unwrap();
        cache.get_or_compute(&csv(2)).await.unwrap();

        let fingerprint = outcome.fingerprint.clone().unwrap();
        assert_eq!(cache.invalidate(&fingerprint), 1);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_poisoned_lock_bypasses() {
        let cache = cache(8);
        cache.poison();
        let outcome = cache.get_or_compute(&csv(1)).await.unwrap();
        assert!(outcome.passed());
        assert!(cache.stats().bypasses >= 1);
        assert_eq!(cache.len(), 0);
    }
}
