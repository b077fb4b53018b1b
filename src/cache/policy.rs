//! Cache Policies and Eviction Ordering
//!
//! A [`CachePolicy`] travels with every write and is fixed for the life of the
//! entry. The eviction engine orders candidates by priority first and by the
//! strategy's own key second; `Critical` entries are therefore only reached
//! once every other candidate is gone.

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::entry::{CacheKey, CacheType};

/// Strategy used to pick eviction victims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionStrategy {
    /// Least recently used first
    #[default]
    Lru,
    /// Least frequently used first, oldest access breaks ties
    Lfu,
    /// Oldest insertion first, regardless of access
    Fifo,
    /// Closest to expiry first
    TtlBased,
}

impl EvictionStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            EvictionStrategy::Lru => "LRU",
            EvictionStrategy::Lfu => "LFU",
            EvictionStrategy::Fifo => "FIFO",
            EvictionStrategy::TtlBased => "TTL",
        }
    }

    /// Compare two candidates by this strategy alone (`Less` = evict first)
    pub fn compare(&self, a: &EvictionCandidate<'_>, b: &EvictionCandidate<'_>) -> Ordering {
        match self {
            EvictionStrategy::Lru => a.access_tick.cmp(&b.access_tick),
            EvictionStrategy::Lfu => a
                .access_count
                .cmp(&b.access_count)
                .then(a.access_tick.cmp(&b.access_tick)),
            EvictionStrategy::Fifo => a.insert_tick.cmp(&b.insert_tick),
            EvictionStrategy::TtlBased => a
                .remaining_ttl
                .cmp(&b.remaining_ttl)
                .then(a.insert_tick.cmp(&b.insert_tick)),
        }
    }
}

impl std::fmt::Display for EvictionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for EvictionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionStrategy::Lru),
            "lfu" => Ok(EvictionStrategy::Lfu),
            "fifo" => Ok(EvictionStrategy::Fifo),
            "ttl" | "ttl_based" | "ttl-based" => Ok(EvictionStrategy::TtlBased),
            other => Err(format!("unknown eviction strategy: {other}")),
        }
    }
}

/// Entry priority; lower priorities are evicted first
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CachePriority {
    Low,
    #[default]
    Normal,
    High,
    /// Never evicted while a non-critical candidate remains
    Critical,
}

/// Per-write cache policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Time to live from insertion
    pub ttl: Duration,
    /// Largest logical size accepted for one entry under this policy
    pub max_size: u64,
    /// Victim ordering used when this write needs room
    pub eviction_strategy: EvictionStrategy,
    /// Compress the stored payload
    pub compression_enabled: bool,
    /// Eviction priority of the entry
    pub priority: CachePriority,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_size: 1024 * 1024,
            eviction_strategy: EvictionStrategy::Lru,
            compression_enabled: true,
            priority: CachePriority::Normal,
        }
    }
}

impl CachePolicy {
    /// Default policy for a content type
    pub fn for_type(cache_type: CacheType) -> Self {
        match cache_type {
            CacheType::NoteContent => Self::note_content(),
            CacheType::NoteMetadata => Self {
                ttl: Duration::from_secs(24 * 3600),
                max_size: 64 * 1024,
                compression_enabled: false,
                ..Self::default()
            },
            CacheType::SearchResults => Self::search_results(),
            CacheType::AiProcessingResult => Self::ai_result(),
            CacheType::AudioTranscription => Self {
                ttl: Duration::from_secs(7 * 24 * 3600),
                max_size: 4 * 1024 * 1024,
                eviction_strategy: EvictionStrategy::Lfu,
                ..Self::default()
            },
            CacheType::UserPreferences => Self {
                ttl: Duration::from_secs(30 * 24 * 3600),
                max_size: 64 * 1024,
                compression_enabled: false,
                priority: CachePriority::Critical,
                ..Self::default()
            },
            CacheType::AnalyticsData => Self {
                ttl: Duration::from_secs(3600),
                eviction_strategy: EvictionStrategy::Fifo,
                priority: CachePriority::Low,
                ..Self::default()
            },
        }
    }

    /// Note bodies: kept a day, high priority
    pub fn note_content() -> Self {
        Self {
            ttl: Duration::from_secs(24 * 3600),
            priority: CachePriority::High,
            ..Self::default()
        }
    }

    /// Search bundles go stale quickly
    pub fn search_results() -> Self {
        Self {
            ttl: Duration::from_secs(30 * 60),
            max_size: 2 * 1024 * 1024,
            ..Self::default()
        }
    }

    /// AI results are expensive to recompute; keep the frequently reused ones
    pub fn ai_result() -> Self {
        Self {
            ttl: Duration::from_secs(7 * 24 * 3600),
            eviction_strategy: EvictionStrategy::Lfu,
            priority: CachePriority::High,
            ..Self::default()
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_strategy(mut self, strategy: EvictionStrategy) -> Self {
        self.eviction_strategy = strategy;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression_enabled = enabled;
        self
    }

    pub fn with_priority(mut self, priority: CachePriority) -> Self {
        self.priority = priority;
        self
    }
}

// =============================================================================
// Eviction Engine
// =============================================================================

/// Snapshot of the fields of an entry that eviction decisions use
#[derive(Debug, Clone)]
pub struct EvictionCandidate<'a> {
    pub key: &'a CacheKey,
    pub priority: CachePriority,
    pub access_count: u32,
    /// Store clock at last access
    pub access_tick: u64,
    /// Store clock at insertion
    pub insert_tick: u64,
    /// Zero once expired
    pub remaining_ttl: Duration,
}

/// Full victim ordering: priority, then strategy, then key for determinism
pub fn victim_order(
    strategy: EvictionStrategy,
    a: &EvictionCandidate<'_>,
    b: &EvictionCandidate<'_>,
) -> Ordering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| strategy.compare(a, b))
        .then_with(|| a.key.cmp(b.key))
}

/// Sort candidates so that the first element is the next victim
pub fn order_victims(strategy: EvictionStrategy, candidates: &mut [EvictionCandidate<'_>]) {
    candidates.sort_by(|a, b| victim_order(strategy, a, b));
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(
        key: &CacheKey,
        priority: CachePriority,
        access_count: u32,
        access_tick: u64,
        insert_tick: u64,
        remaining_secs: u64,
    ) -> EvictionCandidate<'_> {
        EvictionCandidate {
            key,
            priority,
            access_count,
            access_tick,
            insert_tick,
            remaining_ttl: Duration::from_secs(remaining_secs),
        }
    }

    fn keys(n: usize) -> Vec<CacheKey> {
        (0..n)
            .map(|i| CacheKey::new(CacheType::NoteContent, format!("note-{i}")))
            .collect()
    }

    fn victim_ids(strategy: EvictionStrategy, mut c: Vec<EvictionCandidate<'_>>) -> Vec<String> {
        order_victims(strategy, &mut c);
        c.iter().map(|c| c.key.identifier().to_string()).collect()
    }

    #[test]
    fn test_lru_orders_by_last_access() {
        let k = keys(3);
        let c = vec![
            candidate(&k[0], CachePriority::Normal, 1, 30, 1, 100),
            candidate(&k[1], CachePriority::Normal, 9, 10, 2, 100),
            candidate(&k[2], CachePriority::Normal, 1, 20, 3, 100),
        ];
        assert_eq!(victim_ids(EvictionStrategy::Lru, c), ["note-1", "note-2", "note-0"]);
    }

    #[test]
    fn test_lfu_breaks_ties_by_recency() {
        let k = keys(3);
        let c = vec![
            candidate(&k[0], CachePriority::Normal, 5, 1, 1, 100),
            candidate(&k[1], CachePriority::Normal, 2, 9, 2, 100),
            candidate(&k[2], CachePriority::Normal, 2, 4, 3, 100),
        ];
        assert_eq!(victim_ids(EvictionStrategy::Lfu, c), ["note-2", "note-1", "note-0"]);
    }

    #[test]
    fn test_fifo_ignores_access() {
        let k = keys(3);
        let c = vec![
            candidate(&k[0], CachePriority::Normal, 1, 1, 3, 100),
            candidate(&k[1], CachePriority::Normal, 50, 99, 1, 100),
            candidate(&k[2], CachePriority::Normal, 1, 2, 2, 100),
        ];
        assert_eq!(victim_ids(EvictionStrategy::Fifo, c), ["note-1", "note-2", "note-0"]);
    }

    #[test]
    fn test_ttl_puts_expired_first() {
        let k = keys(3);
        let c = vec![
            candidate(&k[0], CachePriority::Normal, 1, 1, 1, 60),
            candidate(&k[1], CachePriority::Normal, 100, 100, 2, 0),
            candidate(&k[2], CachePriority::Normal, 1, 2, 3, 5),
        ];
        assert_eq!(victim_ids(EvictionStrategy::TtlBased, c), ["note-1", "note-2", "note-0"]);
    }

    #[test]
    fn test_priority_precedes_strategy() {
        let k = keys(4);
        let c = vec![
            candidate(&k[0], CachePriority::Critical, 0, 0, 0, 0),
            candidate(&k[1], CachePriority::High, 0, 1, 1, 100),
            candidate(&k[2], CachePriority::Low, 10, 50, 2, 100),
            candidate(&k[3], CachePriority::Normal, 0, 2, 3, 100),
        ];
        assert_eq!(
            victim_ids(EvictionStrategy::Lru, c),
            ["note-2", "note-3", "note-1", "note-0"]
        );
    }

    #[test]
    fn test_policy_presets() {
        let note = CachePolicy::for_type(CacheType::NoteContent);
        assert_eq!(note.priority, CachePriority::High);
        assert_eq!(note.ttl, Duration::from_secs(86_400));

        let prefs = CachePolicy::for_type(CacheType::UserPreferences);
        assert_eq!(prefs.priority, CachePriority::Critical);
        assert!(!prefs.compression_enabled);

        assert_eq!(
            CachePolicy::for_type(CacheType::AiProcessingResult).eviction_strategy,
            EvictionStrategy::Lfu
        );
    }

    #[test]
    fn test_policy_builders() {
        let policy = CachePolicy::default()
            .with_ttl(Duration::from_millis(1))
            .with_max_size(10)
            .with_strategy(EvictionStrategy::Fifo)
            .with_compression(false)
            .with_priority(CachePriority::Low);

        assert_eq!(policy.ttl, Duration::from_millis(1));
        assert_eq!(policy.max_size, 10);
        assert_eq!(policy.eviction_strategy, EvictionStrategy::Fifo);
        assert!(!policy.compression_enabled);
        assert_eq!(policy.priority, CachePriority::Low);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("LRU".parse::<EvictionStrategy>(), Ok(EvictionStrategy::Lru));
        assert_eq!("ttl-based".parse::<EvictionStrategy>(), Ok(EvictionStrategy::TtlBased));
        assert!("random".parse::<EvictionStrategy>().is_err());
    }
}
