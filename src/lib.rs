//! Voice Notes Cache - Intelligent Caching for a Voice-Notes App
//!
//! A bounded, in-memory cache for note bodies, search-result bundles and AI
//! processing results. Writes are budgeted by logical size, evicted by
//! per-entry policy (LRU, LFU, FIFO or TTL, with priorities), optionally LZ4
//! compressed, and preloaded ahead of demand from observed access patterns.
//!
//! # Architecture
//!
//! ```text
//! AccessTracker (Eyes) → PreloadingStrategy (Brain) → CacheManager (Hands)
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Cache manager, values, policies, tracking and preloading
//! - [`config`] - YAML settings
//! - [`error`] - Error types
//! - [`monitoring`] - Prometheus exporter and health checks
//! - [`workload`] - Seeded synthetic traffic for tuning

pub mod cache;
pub mod config;
pub mod error;
pub mod monitoring;
pub mod workload;

// Re-export commonly used types
pub use cache::{
    CacheConfig, CacheKey, CacheManager, CacheMetrics, CachePolicy, CacheType, CachedValue,
    EvictionStrategy,
};
pub use config::Settings;
pub use error::{Error, Result};
pub use monitoring::{CacheExporter, HealthCheck};
