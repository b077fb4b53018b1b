//! Cache Manager
//!
//! Bounded in-memory store of [`CachedValue`]s with policy-driven eviction,
//! payload compression, access tracking, preloading and live metrics.
//!
//! # Concurrency
//!
//! The store, its size bookkeeping and the operation counters sit behind one
//! mutex. Critical sections never await: payloads are encoded before the
//! lock is taken and decoded after it is released, so a cancelled operation
//! never leaves partially applied state behind.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::compression::{CompressionAlgorithm, CompressionConfig, CompressionManager};
use super::data::{CacheableData, CachedValue};
use super::entry::{AccessMetadata, CacheEntry, CacheKey};
use super::maintenance::{self, MaintenanceConfig, MaintenanceHandle};
use super::metrics::{CacheMetrics, LatencyStats, LatencyTracker, StoreStats};
use super::policy::{order_victims, CachePolicy, CachePriority, EvictionStrategy};
use super::preload::{
    ContextProvider, FrequencyBasedPreloadingStrategy, PreloadConfig, PreloadContext,
    PreloadRecommendation, PreloadSource, PreloadingStrategy,
};
use super::results::{
    BatchCacheResult, CacheWrite, ClearResult, InvalidationPattern, InvalidationResult,
    OperationError, OptimizationResult, PreloadResult,
};
use super::tracker::{AccessKind, AccessTracker, TrackerConfig};
use crate::error::{Error, Result};

/// Cache configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Budget in logical bytes
    pub max_memory_bytes: u64,
    /// Values at least this large are encoded and decoded on the blocking pool
    pub blocking_threshold_bytes: u64,
    pub compression: CompressionConfig,
    pub tracker: TrackerConfig,
    pub preload: PreloadConfig,
    pub maintenance: MaintenanceConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: 50 * 1024 * 1024,
            blocking_threshold_bytes: 64 * 1024,
            compression: CompressionConfig::default(),
            tracker: TrackerConfig::default(),
            preload: PreloadConfig::default(),
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Default configuration with the given budget
    pub fn with_budget(max_memory_bytes: u64) -> Self {
        Self {
            max_memory_bytes,
            ..Self::default()
        }
    }
}

/// Items removed by one store sweep
#[derive(Debug, Default)]
struct Sweep {
    removed: usize,
    bytes: u64,
    errors: Vec<OperationError>,
}

/// Mutex-guarded state
#[derive(Debug, Default)]
struct Store {
    entries: HashMap<CacheKey, CacheEntry>,
    /// Sum of logical sizes of stored entries
    total_size: u64,
    /// Sum of payload sizes of stored entries
    physical_size: u64,
    /// Logical clock ordering inserts and accesses
    clock: u64,
    stats: StoreStats,
}

impl Store {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn is_live(&self, key: &CacheKey, now: Instant) -> bool {
        self.entries.get(key).is_some_and(|e| !e.is_expired_at(now))
    }

    fn fits(&self, needed: u64, limit: u64) -> bool {
        self.total_size.saturating_add(needed) <= limit
    }

    /// Insert an entry under a key known to be absent
    fn insert(&mut self, key: CacheKey, entry: CacheEntry) {
        self.total_size += entry.logical_size;
        self.physical_size += entry.physical_size();
        self.entries.insert(key, entry);
    }

    /// Remove an entry and release its size.
    ///
    /// An accounting mismatch still removes the entry; totals are then
    /// recomputed from the store and the mismatch is reported.
    fn take(&mut self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let Some(entry) = self.entries.remove(key) else {
            return Ok(None);
        };
        self.physical_size = self.physical_size.saturating_sub(entry.physical_size());
        match self.total_size.checked_sub(entry.logical_size) {
            Some(total) => {
                self.total_size = total;
                Ok(Some(entry))
            }
            None => {
                let recorded = self.total_size;
                self.resync();
                Err(Error::Accounting(format!(
                    "releasing {} bytes for {key} from a recorded total of {recorded}",
                    entry.logical_size
                )))
            }
        }
    }

    /// Rebuild the entry table at the smallest capacity holding the live
    /// entries. Returns the entries moved and the table bytes released.
    fn compact(&mut self) -> (usize, u64) {
        let before = self.entries.capacity();
        self.entries.shrink_to_fit();
        let after = self.entries.capacity();
        if after >= before {
            return (0, 0);
        }

        let slot = std::mem::size_of::<(CacheKey, CacheEntry)>() as u64;
        let freed = (before - after) as u64 * slot;
        debug!(entries = self.entries.len(), before, after, freed, "Compacted entry table");
        (self.entries.len(), freed)
    }

    fn resync(&mut self) {
        self.total_size = self.entries.values().map(|e| e.logical_size).sum();
        self.physical_size = self.entries.values().map(|e| e.physical_size()).sum();
    }

    fn remove_all(&mut self, keys: impl IntoIterator<Item = CacheKey>) -> Sweep {
        let mut sweep = Sweep::default();
        for key in keys {
            match self.take(&key) {
                Ok(Some(entry)) => {
                    sweep.removed += 1;
                    sweep.bytes += entry.logical_size;
                }
                Ok(None) => {}
                Err(e) => {
                    sweep.removed += 1;
                    sweep.errors.push(OperationError::for_key(&key, &e));
                }
            }
        }
        sweep
    }

    fn purge_expired(&mut self, now: Instant) -> Sweep {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        let sweep = self.remove_all(expired);
        self.stats.expirations += sweep.removed as u64;
        if sweep.removed > 0 {
            debug!(removed = sweep.removed, bytes = sweep.bytes, "Purged expired entries");
        }
        sweep
    }

    /// Evict until `needed` more logical bytes fit in `budget`.
    ///
    /// Expired entries go first, then victims in `strategy` order.
    fn make_room(
        &mut self,
        needed: u64,
        budget: u64,
        strategy: EvictionStrategy,
        now: Instant,
    ) -> Sweep {
        if self.fits(needed, budget) {
            return Sweep::default();
        }

        let purged = self.purge_expired(now);
        if self.fits(needed, budget) {
            return Sweep {
                errors: purged.errors,
                ..Sweep::default()
            };
        }

        let excess = self.total_size.saturating_add(needed) - budget;
        let victims: Vec<CacheKey> = {
            let mut candidates: Vec<_> =
                self.entries.iter().map(|(k, e)| e.candidate(k, now)).collect();
            order_victims(strategy, &mut candidates);

            let mut freed = 0u64;
            let mut victims = Vec::new();
            for candidate in &candidates {
                if freed >= excess {
                    break;
                }
                freed += self.entries.get(candidate.key).map_or(0, |e| e.logical_size);
                victims.push(candidate.key.clone());
            }
            victims
        };

        for key in &victims {
            debug!(%key, strategy = %strategy, "Evicting entry");
        }
        let mut evicted = self.remove_all(victims);
        self.stats.evictions += evicted.removed as u64;
        evicted.errors.extend(purged.errors);
        evicted
    }
}

/// Outcome of the locked phase of a lookup
enum Lookup {
    Hit {
        payload: Vec<u8>,
        previous: AccessMetadata,
        insert_tick: u64,
    },
    Miss,
}

/// Voice-notes cache manager
pub struct CacheManager {
    store: Mutex<Store>,
    config: CacheConfig,
    codec: Arc<CompressionManager>,
    tracker: AccessTracker,
    latency: LatencyStats,
    metrics_tx: watch::Sender<CacheMetrics>,
    preload_source: Option<Arc<dyn PreloadSource>>,
    strategy: Arc<dyn PreloadingStrategy>,
}

impl CacheManager {
    /// Create a manager with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        let (metrics_tx, _) = watch::channel(CacheMetrics::empty(config.max_memory_bytes));
        Self {
            store: Mutex::new(Store::default()),
            codec: Arc::new(CompressionManager::with_config(config.compression.clone())),
            tracker: AccessTracker::with_config(config.tracker.clone()),
            latency: LatencyStats::default(),
            metrics_tx,
            preload_source: None,
            strategy: Arc::new(FrequencyBasedPreloadingStrategy::new()),
            config,
        }
    }

    /// Source used by [`preload`](Self::preload)
    pub fn with_preload_source(mut self, source: Arc<dyn PreloadSource>) -> Self {
        self.preload_source = Some(source);
        self
    }

    /// Strategy used by [`recommend_preloads`](Self::recommend_preloads)
    pub fn with_strategy(mut self, strategy: Arc<dyn PreloadingStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn tracker(&self) -> &AccessTracker {
        &self.tracker
    }

    pub fn has_preload_source(&self) -> bool {
        self.preload_source.is_some()
    }

    /// Stored entries, expired ones included until they are purged
    pub fn len(&self) -> usize {
        self.store.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().entries.is_empty()
    }

    /// Logical bytes currently accounted
    pub fn total_size(&self) -> u64 {
        self.store.lock().total_size
    }

    /// Whether `key` holds an unexpired entry. Not an access.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.store.lock().is_live(key, Instant::now())
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Store `data` under `key`.
    ///
    /// An existing entry under the same key is replaced along with its policy.
    /// Entries are evicted in the order of `policy.eviction_strategy` until
    /// the write fits the budget.
    #[instrument(level = "debug", skip(self, key, data, policy), fields(key = %key))]
    pub async fn cache(
        &self,
        key: CacheKey,
        data: impl Into<CachedValue>,
        policy: CachePolicy,
    ) -> Result<CacheWrite> {
        let timer = LatencyTracker::start();
        let value: CachedValue = data.into();
        let logical = value.size();
        let budget = self.config.max_memory_bytes;

        if logical > budget {
            return Err(Error::OversizedPayload {
                size: logical,
                budget,
            });
        }
        if logical > policy.max_size {
            return Err(Error::EntryTooLarge {
                size: logical,
                limit: policy.max_size,
            });
        }

        // The write is the first access
        let access = value.access().advanced();
        let payload = self.encode(value, logical, policy.compression_enabled).await?;
        let compressed = CompressionAlgorithm::of(&payload)? != CompressionAlgorithm::None;
        let stored_size = payload.len() as u64;
        let strategy = policy.eviction_strategy;

        let (replaced, evicted) = {
            let mut store = self.store.lock();
            let now = Instant::now();

            let replaced = match store.take(&key) {
                Ok(previous) => previous.is_some(),
                Err(e) => {
                    warn!(error = %e, "Size accounting resynchronized");
                    true
                }
            };

            let eviction = store.make_room(logical, budget, strategy, now);
            for error in &eviction.errors {
                warn!(key = ?error.key, error = %error.message, "Eviction accounting error");
            }

            let tick = store.tick();
            store.insert(key.clone(), CacheEntry::new(payload, logical, policy, access, tick));
            store.stats.writes += 1;
            self.publish(&store);
            (replaced, eviction.removed)
        };

        self.tracker.record(&key, AccessKind::Write);
        self.latency.record_write(timer.elapsed());
        debug!(logical, stored = stored_size, compressed, evicted, replaced, "Cached entry");

        Ok(CacheWrite {
            logical_size: logical,
            stored_size,
            compressed,
            evicted,
            replaced,
        })
    }

    /// Store several values; a failing item does not stop the batch
    pub async fn cache_all<I, V>(&self, items: I) -> BatchCacheResult
    where
        I: IntoIterator<Item = (CacheKey, V, CachePolicy)>,
        V: Into<CachedValue>,
    {
        let mut stored = 0;
        let mut errors = Vec::new();
        for (key, value, policy) in items {
            match self.cache(key.clone(), value, policy).await {
                Ok(_) => stored += 1,
                Err(e) => {
                    debug!(%key, error = %e, "Batch item not cached");
                    errors.push(OperationError::for_key(&key, &e));
                }
            }
        }
        BatchCacheResult::from_parts(stored, errors)
    }

    async fn encode(&self, value: CachedValue, logical: u64, compress: bool) -> Result<Vec<u8>> {
        if logical >= self.config.blocking_threshold_bytes {
            let codec = Arc::clone(&self.codec);
            tokio::task::spawn_blocking(move || value.compress_with(&codec, compress))
                .await
                .map_err(|e| Error::Internal(format!("encode task failed: {e}")))?
        } else {
            value.compress_with(&self.codec, compress)
        }
    }

    async fn decode(&self, payload: Vec<u8>, previous: AccessMetadata) -> Result<CachedValue> {
        if payload.len() as u64 >= self.config.blocking_threshold_bytes {
            let codec = Arc::clone(&self.codec);
            tokio::task::spawn_blocking(move || CachedValue::restore(&codec, &payload, &previous))
                .await
                .map_err(|e| Error::Internal(format!("decode task failed: {e}")))?
        } else {
            CachedValue::restore(&self.codec, &payload, &previous)
        }
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Look up `key`.
    ///
    /// Expired entries and entries whose payload no longer decodes are purged
    /// and reported as a miss.
    #[instrument(level = "debug", skip(self, key), fields(key = %key))]
    pub async fn retrieve(&self, key: &CacheKey) -> Option<CachedValue> {
        let timer = LatencyTracker::start();

        let lookup = {
            let mut store = self.store.lock();
            let now = Instant::now();
            let tick = store.tick();

            let mut expired = false;
            let lookup = match store.entries.get_mut(key) {
                Some(entry) if entry.is_expired_at(now) => {
                    expired = true;
                    Lookup::Miss
                }
                Some(entry) => {
                    let previous = entry.access;
                    entry.record_access(tick);
                    Lookup::Hit {
                        payload: entry.payload.clone(),
                        previous,
                        insert_tick: entry.insert_tick,
                    }
                }
                None => Lookup::Miss,
            };

            if expired {
                if let Err(e) = store.take(key) {
                    warn!(error = %e, "Size accounting resynchronized");
                }
                store.stats.expirations += 1;
                debug!("Entry expired");
            }
            match lookup {
                Lookup::Hit { .. } => store.stats.hits += 1,
                Lookup::Miss => store.stats.misses += 1,
            }
            self.publish(&store);
            lookup
        };

        let Lookup::Hit {
            payload,
            previous,
            insert_tick,
        } = lookup
        else {
            self.tracker.record(key, AccessKind::Miss);
            self.latency.record_read(timer.elapsed());
            return None;
        };

        match self.decode(payload, previous).await {
            Ok(value) => {
                self.tracker.record(key, AccessKind::Hit);
                self.latency.record_read(timer.elapsed());
                Some(value)
            }
            Err(e) => {
                warn!(error = %e, "Dropping entry with undecodable payload");
                let mut store = self.store.lock();
                // Only drop the entry that was read, not a newer write
                if store.entries.get(key).is_some_and(|entry| entry.insert_tick == insert_tick) {
                    if let Err(e) = store.take(key) {
                        warn!(error = %e, "Size accounting resynchronized");
                    }
                }
                store.stats.decode_failures += 1;
                store.stats.hits = store.stats.hits.saturating_sub(1);
                store.stats.misses += 1;
                self.publish(&store);
                drop(store);

                self.tracker.record(key, AccessKind::Miss);
                None
            }
        }
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Remove every entry matching `pattern`
    #[instrument(skip(self, pattern), fields(pattern = %pattern))]
    pub async fn invalidate(&self, pattern: InvalidationPattern) -> InvalidationResult {
        let sweep = {
            let mut store = self.store.lock();
            let matching: Vec<CacheKey> = store
                .entries
                .keys()
                .filter(|k| pattern.matches(k))
                .cloned()
                .collect();
            let sweep = store.remove_all(matching);
            self.publish(&store);
            sweep
        };

        if sweep.removed > 0 {
            info!(removed = sweep.removed, bytes = sweep.bytes, "Invalidated entries");
        }
        InvalidationResult {
            removed: sweep.removed,
            bytes_freed: sweep.bytes,
            errors: sweep.errors,
        }
    }

    /// Remove every entry. Access history is kept.
    pub async fn clear_all(&self) -> ClearResult {
        let result = {
            let mut store = self.store.lock();
            let removed = store.entries.len();
            let bytes_freed = store.total_size;
            store.entries.clear();
            store.total_size = 0;
            store.physical_size = 0;
            self.publish(&store);
            ClearResult {
                removed,
                bytes_freed,
                errors: Vec::new(),
            }
        };
        info!(removed = result.removed, bytes = result.bytes_freed, "Cleared cache");
        result
    }

    // =========================================================================
    // Preloading
    // =========================================================================

    /// Load `keys` from the preload source at `Low` priority.
    ///
    /// Keys already cached are skipped. Preloading never evicts: a value that
    /// would push utilization past the configured ceiling is skipped too.
    pub async fn preload<I>(&self, keys: I) -> PreloadResult
    where
        I: IntoIterator<Item = CacheKey>,
    {
        self.preload_with_priority(keys.into_iter().map(|key| (key, CachePriority::Low)))
            .await
    }

    /// Load keys from the preload source, each stored at its own priority.
    ///
    /// Apart from the priority, entries get the default policy of their type.
    /// The first occurrence of a repeated key wins.
    #[instrument(skip(self, keys))]
    pub async fn preload_with_priority<I>(&self, keys: I) -> PreloadResult
    where
        I: IntoIterator<Item = (CacheKey, CachePriority)>,
    {
        let timer = LatencyTracker::start();
        let mut result = PreloadResult::default();
        let keys: Vec<(CacheKey, CachePriority)> = keys.into_iter().collect();

        let Some(source) = self.preload_source.clone() else {
            if !keys.is_empty() {
                result.failed = keys.len();
                result.errors.push(OperationError::general(&Error::NoPreloadSource));
            }
            result.elapsed = timer.elapsed();
            return result;
        };

        let pending: Vec<(CacheKey, CachePriority)> = {
            let store = self.store.lock();
            let now = Instant::now();
            let mut seen = HashSet::new();
            let mut pending = Vec::new();
            for (key, priority) in keys {
                if !seen.insert(key.clone()) {
                    continue;
                }
                if store.is_live(&key, now) {
                    result.skipped += 1;
                } else {
                    pending.push((key, priority));
                }
            }
            pending
        };

        let timeout = self.config.preload.timeout;
        let loads: Vec<(CacheKey, CachePriority, Result<Option<CachedValue>>)> = stream::iter(pending)
            .map(|(key, priority)| {
                let source = Arc::clone(&source);
                async move {
                    let loaded = match tokio::time::timeout(timeout, source.load(&key)).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(Error::PreloadFailed {
                            key: key.to_string(),
                            reason: e.to_string(),
                        }),
                        Err(_) => Err(Error::Timeout(format!("preloading {key}"))),
                    };
                    (key, priority, loaded)
                }
            })
            .buffer_unordered(self.config.preload.concurrency.max(1))
            .collect()
            .await;

        for (key, priority, loaded) in loads {
            let outcome = match loaded {
                Ok(Some(value)) => self.store_preloaded(key.clone(), value, priority).await,
                Ok(None) => Ok(false),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(true) => result.loaded += 1,
                Ok(false) => result.skipped += 1,
                Err(e) => {
                    warn!(%key, error = %e, "Preload failed");
                    result.failed += 1;
                    result.errors.push(OperationError::for_key(&key, &e));
                }
            }
        }

        result.elapsed = timer.elapsed();
        debug!(
            loaded = result.loaded,
            skipped = result.skipped,
            failed = result.failed,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Preload finished"
        );
        result
    }

    /// Store a preloaded value without evicting anything.
    ///
    /// Like [`cache`](Self::cache), the write counts as the first access.
    async fn store_preloaded(
        &self,
        key: CacheKey,
        value: CachedValue,
        priority: CachePriority,
    ) -> Result<bool> {
        let timer = LatencyTracker::start();
        let policy = CachePolicy::for_type(key.cache_type()).with_priority(priority);
        let logical = value.size();
        if logical > policy.max_size {
            return Err(Error::EntryTooLarge {
                size: logical,
                limit: policy.max_size,
            });
        }

        let access = value.access().advanced();
        let payload = self.encode(value, logical, policy.compression_enabled).await?;
        let ceiling =
            (self.config.max_memory_bytes as f64 * self.config.preload.max_utilization) as u64;

        let mut store = self.store.lock();
        let now = Instant::now();
        if store.is_live(&key, now) {
            return Ok(false);
        }
        // Whatever is left under the key has expired
        if store.take(&key)?.is_some() {
            store.stats.expirations += 1;
        }
        if !store.fits(logical, ceiling.min(self.config.max_memory_bytes)) {
            return Ok(false);
        }

        let tick = store.tick();
        store.insert(key.clone(), CacheEntry::new(payload, logical, policy, access, tick));
        store.stats.writes += 1;
        self.publish(&store);
        drop(store);

        self.tracker.record(&key, AccessKind::Write);
        self.latency.record_write(timer.elapsed());
        Ok(true)
    }

    /// Recommendations for `context`, minus keys already cached
    pub fn recommend_preloads(&self, context: &PreloadContext) -> Vec<PreloadRecommendation> {
        let recommendations = self.strategy.recommendations(context, &self.tracker);
        let store = self.store.lock();
        let now = Instant::now();
        recommendations
            .into_iter()
            .filter(|r| !store.is_live(&r.key, now))
            .collect()
    }

    /// Preload whatever the strategy recommends for `context`
    pub async fn preload_recommended(&self, context: &PreloadContext) -> PreloadResult {
        let recommendations = self.recommend_preloads(context);
        debug!(
            strategy = self.strategy.name(),
            count = recommendations.len(),
            "Preload recommendations"
        );
        self.preload_with_priority(recommendations.into_iter().map(|r| (r.key, r.priority)))
            .await
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Purge expired entries, drop entries failing their integrity check and
    /// compact the entry table left oversized by removals.
    #[instrument(skip(self))]
    pub async fn optimize(&self) -> OptimizationResult {
        let timer = LatencyTracker::start();
        let mut result = {
            let mut store = self.store.lock();
            let now = Instant::now();

            let expired = store.purge_expired(now);

            let corrupted: Vec<CacheKey> = store
                .entries
                .iter()
                .filter(|(_, e)| !e.verify_integrity())
                .map(|(k, _)| k.clone())
                .collect();
            let mut errors: Vec<OperationError> = corrupted
                .iter()
                .map(|k| OperationError::for_key(k, &Error::IntegrityCheckFailed(k.to_string())))
                .collect();
            let dropped = store.remove_all(corrupted);
            store.stats.integrity_failures += dropped.removed as u64;

            let (entries_compacted, bytes_freed) = store.compact();

            errors.extend(expired.errors);
            errors.extend(dropped.errors);
            self.publish(&store);

            OptimizationResult {
                expired_removed: expired.removed,
                corrupted_removed: dropped.removed,
                entries_compacted,
                bytes_freed,
                elapsed: Default::default(),
                errors,
            }
        };

        result.elapsed = timer.elapsed();
        info!(
            expired = result.expired_removed,
            corrupted = result.corrupted_removed,
            compacted = result.entries_compacted,
            bytes_freed = result.bytes_freed,
            "Optimization pass complete"
        );
        result
    }

    /// Spawn the periodic optimize and preload tasks
    pub fn start(self: &Arc<Self>, context: Arc<dyn ContextProvider>) -> MaintenanceHandle {
        maintenance::spawn(Arc::clone(self), context, self.config.maintenance.clone())
    }

    // =========================================================================
    // Metrics
    // =========================================================================

    /// Live metrics, republished after every operation
    pub fn metrics(&self) -> watch::Receiver<CacheMetrics> {
        self.metrics_tx.subscribe()
    }

    /// Live metrics as a stream; yields the current value first
    pub fn metrics_stream(&self) -> impl Stream<Item = CacheMetrics> + Send + 'static {
        let rx = self.metrics_tx.subscribe();
        stream::unfold((rx, true), |(mut rx, first)| async move {
            if !first && rx.changed().await.is_err() {
                return None;
            }
            let current = rx.borrow_and_update().clone();
            Some((current, (rx, false)))
        })
    }

    /// Freshly computed metrics
    pub fn metrics_snapshot(&self) -> CacheMetrics {
        let store = self.store.lock();
        self.compute_metrics(&store)
    }

    fn compute_metrics(&self, store: &Store) -> CacheMetrics {
        CacheMetrics::compute(
            &store.stats,
            store.entries.len(),
            store.total_size,
            self.config.max_memory_bytes,
            store.physical_size,
            self.latency.read(),
            self.latency.write(),
        )
    }

    fn publish(&self, store: &Store) {
        self.metrics_tx.send_replace(self.compute_metrics(store));
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
