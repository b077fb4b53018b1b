//! Access Tracker
//!
//! Per-key access history kept independently of the store, so frequency
//! information survives eviction and feeds preloading decisions.
//!
//! Memory is bounded twice: each key keeps at most `history_per_key` recent
//! access instants, and at most `max_tracked_keys` keys are tracked (the least
//! recently accessed key is dropped first).

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::entry::CacheKey;

/// Tracker configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    /// Recent access instants retained per key
    pub history_per_key: usize,
    /// Upper bound on tracked keys
    pub max_tracked_keys: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_per_key: 32,
            max_tracked_keys: 10_000,
        }
    }
}

/// Kind of access event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Value written
    Write,
    /// Lookup that found a live entry
    Hit,
    /// Lookup that found nothing
    Miss,
}

/// Aggregate statistics for one key
#[derive(Debug, Clone)]
pub struct AccessStats {
    /// All recorded events
    pub total: u64,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub first_access: Instant,
    pub last_access: Instant,
    recent: VecDeque<Instant>,
}

impl AccessStats {
    fn new(now: Instant) -> Self {
        Self {
            total: 0,
            hits: 0,
            misses: 0,
            writes: 0,
            first_access: now,
            last_access: now,
            recent: VecDeque::new(),
        }
    }

    fn record(&mut self, kind: AccessKind, now: Instant, history: usize) {
        self.total += 1;
        match kind {
            AccessKind::Write => self.writes += 1,
            AccessKind::Hit => self.hits += 1,
            AccessKind::Miss => self.misses += 1,
        }
        self.last_access = now;
        if history > 0 {
            if self.recent.len() == history {
                self.recent.pop_front();
            }
            self.recent.push_back(now);
        }
    }

    /// Lookups, hit or miss: the demand for the key
    pub fn reads(&self) -> u64 {
        self.hits + self.misses
    }

    /// Retained accesses no older than `window`
    pub fn accesses_within(&self, window: Duration, now: Instant) -> usize {
        self.recent
            .iter()
            .rev()
            .take_while(|t| now.saturating_duration_since(**t) <= window)
            .count()
    }

    /// Recent access instants, oldest first
    pub fn recent(&self) -> impl Iterator<Item = &Instant> {
        self.recent.iter()
    }
}

/// Concurrent per-key access tracker
pub struct AccessTracker {
    stats: DashMap<CacheKey, AccessStats>,
    config: TrackerConfig,
}

impl AccessTracker {
    pub fn new() -> Self {
        Self::with_config(TrackerConfig::default())
    }

    pub fn with_config(config: TrackerConfig) -> Self {
        Self {
            stats: DashMap::new(),
            config,
        }
    }

    /// Record an access event for `key`
    pub fn record(&self, key: &CacheKey, kind: AccessKind) {
        let now = Instant::now();
        let history = self.config.history_per_key;

        if let Some(mut stats) = self.stats.get_mut(key) {
            stats.record(kind, now, history);
            return;
        }

        self.stats
            .entry(key.clone())
            .or_insert_with(|| AccessStats::new(now))
            .record(kind, now, history);

        if self.stats.len() > self.config.max_tracked_keys {
            self.prune();
        }
    }

    /// Drop least recently accessed keys down to 90% of the key limit, so
    /// the scan runs once per batch of new keys rather than once per key.
    fn prune(&self) {
        let target = (self.config.max_tracked_keys * 9 / 10).max(1);
        let excess = self.stats.len().saturating_sub(target);
        if excess == 0 {
            return;
        }

        let mut by_age: Vec<(CacheKey, Instant)> = self
            .stats
            .iter()
            .map(|e| (e.key().clone(), e.value().last_access))
            .collect();
        if excess < by_age.len() {
            by_age.select_nth_unstable_by_key(excess, |(_, last)| *last);
        }

        for (key, _) in by_age.into_iter().take(excess) {
            self.stats.remove(&key);
        }
        tracing::debug!(dropped = excess, "Pruned access tracker");
    }

    /// Number of recorded events for `key`
    pub fn frequency(&self, key: &CacheKey) -> u64 {
        self.stats.get(key).map_or(0, |s| s.total)
    }

    /// Last access instant of `key`
    pub fn last_access(&self, key: &CacheKey) -> Option<Instant> {
        self.stats.get(key).map(|s| s.last_access)
    }

    /// Copy of the statistics of `key`
    pub fn stats(&self, key: &CacheKey) -> Option<AccessStats> {
        self.stats.get(key).map(|s| s.clone())
    }

    /// All tracked keys with their statistics, most frequent first
    pub fn most_frequent(&self, limit: usize) -> Vec<(CacheKey, AccessStats)> {
        let mut all: Vec<(CacheKey, AccessStats)> = self
            .stats
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        all.sort_by(|a, b| {
            b.1.total
                .cmp(&a.1.total)
                .then(b.1.last_access.cmp(&a.1.last_access))
                .then_with(|| a.0.cmp(&b.0))
        });
        all.truncate(limit);
        all
    }

    /// Forget one key
    pub fn forget(&self, key: &CacheKey) {
        self.stats.remove(key);
    }

    pub fn len(&self) -> usize {
        self.stats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn clear(&self) {
        self.stats.clear();
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

impl Default for AccessTracker {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::CacheType;

    fn key(id: &str) -> CacheKey {
        CacheKey::new(CacheType::NoteContent, id)
    }

    #[test]
    fn test_record_and_frequency() {
        let tracker = AccessTracker::new();
        tracker.record(&key("a"), AccessKind::Write);
        tracker.record(&key("a"), AccessKind::Hit);
        tracker.record(&key("a"), AccessKind::Miss);

        assert_eq!(tracker.frequency(&key("a")), 3);
        assert_eq!(tracker.frequency(&key("b")), 0);

        let stats = tracker.stats(&key("a")).unwrap();
        assert_eq!(stats.writes, 1);
        assert_eq!(stats.reads(), 2);
        assert!(stats.last_access >= stats.first_access);
    }

    #[test]
    fn test_history_is_capped() {
        let tracker = AccessTracker::with_config(TrackerConfig {
            history_per_key: 4,
            max_tracked_keys: 100,
        });
        for _ in 0..10 {
            tracker.record(&key("a"), AccessKind::Hit);
        }

        let stats = tracker.stats(&key("a")).unwrap();
        assert_eq!(stats.total, 10);
        assert_eq!(stats.recent().count(), 4);
        assert_eq!(stats.accesses_within(Duration::from_secs(60), Instant::now()), 4);
    }

    #[test]
    fn test_key_limit_drops_least_recent_in_batches() {
        let tracker = AccessTracker::with_config(TrackerConfig {
            history_per_key: 4,
            max_tracked_keys: 10,
        });
        for id in 0..11 {
            tracker.record(&key(&id.to_string()), AccessKind::Hit);
            std::thread::sleep(Duration::from_millis(2));
        }

        // Overflowing the limit prunes down to 90% of it
        assert_eq!(tracker.len(), 9);
        assert_eq!(tracker.frequency(&key("0")), 0);
        assert_eq!(tracker.frequency(&key("1")), 0);
        assert_eq!(tracker.frequency(&key("10")), 1);

        // The freed headroom absorbs the next new key without another scan
        tracker.record(&key("11"), AccessKind::Hit);
        assert_eq!(tracker.len(), 10);
        assert_eq!(tracker.frequency(&key("2")), 1);
    }

    #[test]
    fn test_most_frequent_ordering() {
        let tracker = AccessTracker::new();
        for _ in 0..3 {
            tracker.record(&key("hot"), AccessKind::Hit);
        }
        tracker.record(&key("cold"), AccessKind::Hit);
        tracker.record(&key("warm"), AccessKind::Hit);
        tracker.record(&key("warm"), AccessKind::Miss);

        let top = tracker.most_frequent(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].0, key("hot"));
        assert_eq!(top[1].0, key("warm"));
    }

    #[test]
    fn test_concurrent_recording_loses_nothing() {
        use std::sync::Arc;
        use std::thread;

        let tracker = Arc::new(AccessTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    for _ in 0..500 {
                        tracker.record(&key("shared"), AccessKind::Hit);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.frequency(&key("shared")), 4000);
    }

    #[test]
    fn test_forget_and_clear() {
        let tracker = AccessTracker::new();
        tracker.record(&key("a"), AccessKind::Hit);
        tracker.record(&key("b"), AccessKind::Hit);

        tracker.forget(&key("a"));
        assert_eq!(tracker.len(), 1);

        tracker.clear();
        assert!(tracker.is_empty());
    }
}
