//! Intelligent Cache
//!
//! Bounded in-memory cache for note bodies, search-result bundles and AI
//! processing results.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           Cache Manager                                  │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Store (mutex)           │ Access Tracker        │ Preloading Strategy   │
//! │  ┌────────────────────┐  │ ┌──────────────────┐  │ ┌──────────────────┐  │
//! │  │ CacheKey → Entry   │  │ │ DashMap          │  │ │ frequency ×      │  │
//! │  │ logical size total │  │ │ per-key history  │  │ │ recency ×        │  │
//! │  │ counters           │  │ │ (survives evict) │  │ │ activity         │  │
//! │  └────────────────────┘  │ └──────────────────┘  │ └──────────────────┘  │
//! │           │              │          │            │          │            │
//! │   Eviction Engine        │          └────────────┴──────────┘            │
//! │   (priority, then LRU / LFU / FIFO / TTL)        PreloadSource           │
//! │           │                                                              │
//! │   Frame codec + LZ4 ──── watch::Sender<CacheMetrics>                     │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Budget
//!
//! The budget counts logical bytes: the UTF-8 length of every text field of
//! the cached values. Compression lowers the physical footprint without
//! freeing budget; the ratio between the two is reported in the metrics.
//!
//! # Example
//!
//! ```no_run
//! use voicenote_cache::cache::{
//!     CacheConfig, CacheKey, CacheManager, CachePolicy, CacheType, CacheableNote, Note,
//! };
//!
//! # async fn example() -> voicenote_cache::Result<()> {
//! let manager = CacheManager::new(CacheConfig::default());
//! let key = CacheKey::new(CacheType::NoteContent, "42");
//!
//! manager
//!     .cache(key.clone(), CacheableNote::new(Note::new(42, "Groceries", "milk, eggs")), CachePolicy::note_content())
//!     .await?;
//! let cached = manager.retrieve(&key).await;
//! assert!(cached.is_some());
//! # Ok(())
//! # }
//! ```

mod codec;
mod data;
mod entry;
mod maintenance;
mod manager;
mod metrics;
mod policy;
mod preload;
mod results;
mod tracker;
mod proptest;
pub mod compression;

pub use codec::{DataKind, FrameReader, FrameWriter, FRAME_VERSION, MAX_FIELD_LEN};
pub use compression::{CompressionAlgorithm, CompressionConfig, CompressionManager, Compressor};
pub use data::{
    CacheableAiResult, CacheableData, CacheableNote, CacheableSearchResults, CachedValue, Note,
};
pub use entry::{AccessMetadata, CacheKey, CacheType};
pub use maintenance::{MaintenanceConfig, MaintenanceHandle};
pub use manager::{CacheConfig, CacheManager};
pub use metrics::{performance_score, CacheMetrics, LatencyTracker, MemoryPressure};
pub use policy::{
    order_victims, victim_order, CachePolicy, CachePriority, EvictionCandidate, EvictionStrategy,
};
pub use preload::{
    ConnectionType, ContextProvider, DeviceState, FixedContext, FrequencyBasedPreloadingStrategy,
    FrequencyStrategyConfig, InMemorySource, NetworkState, PreloadConfig, PreloadContext,
    PreloadRecommendation, PreloadSource, PreloadingStrategy, ThermalState, UserActivity,
};
pub use results::{
    BatchCacheResult, CacheWrite, ClearResult, InvalidationPattern, InvalidationResult,
    OperationError, OptimizationResult, PreloadResult,
};
pub use tracker::{AccessKind, AccessStats, AccessTracker, TrackerConfig};

/// Default budget (50MB of logical data)
pub const DEFAULT_BUDGET_BYTES: u64 = 50 * 1024 * 1024;

// =============================================================================
// Tests
// =============================================================================
