//! Preloading
//!
//! Context-aware recommendations of keys worth loading before they are
//! requested, and the seams the manager loads them through:
//!
//! - [`PreloadingStrategy`]: turns device context and access history into
//!   advisory [`PreloadRecommendation`]s
//! - [`PreloadSource`]: produces the value for a key (note repository, search
//!   index, AI pipeline)
//! - [`ContextProvider`]: supplies the current [`PreloadContext`] to scheduled
//!   preloading passes

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::data::CachedValue;
use super::entry::{CacheKey, CacheType};
use super::metrics::MemoryPressure;
use super::policy::CachePriority;
use super::tracker::AccessTracker;
use crate::error::Result;

// =============================================================================
// Context
// =============================================================================

/// What the user is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserActivity {
    #[default]
    Idle,
    Recording,
    BrowsingNotes,
    Searching,
    ReviewingAiResults,
}

impl UserActivity {
    /// How likely keys of `cache_type` are needed next, in `0.25..=1.0`
    pub fn affinity(&self, cache_type: CacheType) -> f64 {
        use CacheType::*;
        match (self, cache_type) {
            (_, UserPreferences) => 1.0,
            (UserActivity::BrowsingNotes, NoteContent | NoteMetadata) => 1.0,
            (UserActivity::Searching, SearchResults) => 1.0,
            (UserActivity::Searching, NoteContent | NoteMetadata) => 0.75,
            (UserActivity::ReviewingAiResults, AiProcessingResult) => 1.0,
            (UserActivity::ReviewingAiResults, NoteContent) => 0.75,
            (UserActivity::Recording, AudioTranscription) => 1.0,
            (UserActivity::Recording, AiProcessingResult) => 0.5,
            (UserActivity::Idle, _) => 0.5,
            (_, AnalyticsData) => 0.25,
            _ => 0.4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalState {
    #[default]
    Nominal,
    Fair,
    Hot,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    #[default]
    Wifi,
    Ethernet,
    Cellular,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkState {
    pub connection: ConnectionType,
    pub is_metered: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceState {
    /// CPU usage, `0.0..=1.0`
    pub cpu_usage: f64,
    pub memory_pressure: MemoryPressure,
    pub thermal_state: ThermalState,
    /// Free storage in bytes
    pub available_storage: u64,
}

/// Snapshot of the conditions a preloading decision is made under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreloadContext {
    pub user_activity: UserActivity,
    pub device_state: DeviceState,
    pub network_state: NetworkState,
    /// Battery charge, `0.0..=1.0`
    pub battery_level: f64,
    /// Free memory in bytes
    pub available_memory: u64,
}

impl Default for PreloadContext {
    fn default() -> Self {
        Self {
            user_activity: UserActivity::default(),
            device_state: DeviceState::default(),
            network_state: NetworkState::default(),
            battery_level: 1.0,
            available_memory: 512 * 1024 * 1024,
        }
    }
}

impl PreloadContext {
    pub fn with_activity(mut self, activity: UserActivity) -> Self {
        self.user_activity = activity;
        self
    }

    pub fn with_battery(mut self, level: f64) -> Self {
        self.battery_level = level;
        self
    }

    pub fn with_memory_pressure(mut self, pressure: MemoryPressure) -> Self {
        self.device_state.memory_pressure = pressure;
        self
    }

    pub fn with_thermal_state(mut self, state: ThermalState) -> Self {
        self.device_state.thermal_state = state;
        self
    }

    pub fn with_connection(mut self, connection: ConnectionType) -> Self {
        self.network_state.connection = connection;
        self
    }
}

/// Supplies the current context to scheduled preloading passes
pub trait ContextProvider: Send + Sync {
    fn current(&self) -> PreloadContext;
}

/// Provider that always reports the same context
#[derive(Debug, Clone, Default)]
pub struct FixedContext(pub PreloadContext);

impl ContextProvider for FixedContext {
    fn current(&self) -> PreloadContext {
        self.0.clone()
    }
}

// =============================================================================
// Strategy
// =============================================================================

/// Advisory recommendation to load a key
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadRecommendation {
    pub key: CacheKey,
    pub priority: CachePriority,
    /// `0.0..=1.0`
    pub confidence: f64,
}

/// Produces preload recommendations
pub trait PreloadingStrategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Recommendations, most confident first
    fn recommendations(
        &self,
        context: &PreloadContext,
        tracker: &AccessTracker,
    ) -> Vec<PreloadRecommendation>;
}

/// Tuning for [`FrequencyBasedPreloadingStrategy`]
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyStrategyConfig {
    /// No preloading below this battery level
    pub min_battery: f64,
    /// No preloading above this CPU usage
    pub max_cpu: f64,
    /// Keys with fewer recorded events are ignored
    pub min_frequency: u64,
    /// Recency weight halves every `recency_half_life`
    pub recency_half_life: Duration,
    pub max_recommendations: usize,
    /// Recommendation cap on cellular connections
    pub cellular_limit: usize,
    /// Recommendations below this confidence are dropped
    pub min_confidence: f64,
}

impl Default for FrequencyStrategyConfig {
    fn default() -> Self {
        Self {
            min_battery: 0.2,
            max_cpu: 0.85,
            min_frequency: 2,
            recency_half_life: Duration::from_secs(600),
            max_recommendations: 32,
            cellular_limit: 8,
            min_confidence: 0.05,
        }
    }
}

/// Ranks tracked keys by frequency, recency and activity affinity
#[derive(Debug, Clone, Default)]
pub struct FrequencyBasedPreloadingStrategy {
    config: FrequencyStrategyConfig,
}

impl FrequencyBasedPreloadingStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: FrequencyStrategyConfig) -> Self {
        Self { config }
    }

    /// Why preloading is suppressed under `context`, if it is
    pub fn suppression_reason(&self, context: &PreloadContext) -> Option<&'static str> {
        let device = &context.device_state;
        if device.memory_pressure >= MemoryPressure::High {
            Some("memory pressure")
        } else if device.thermal_state >= ThermalState::Hot {
            Some("thermal state")
        } else if context.battery_level < self.config.min_battery {
            Some("low battery")
        } else if device.cpu_usage > self.config.max_cpu {
            Some("cpu saturated")
        } else {
            None
        }
    }

    fn priority_for(confidence: f64) -> CachePriority {
        if confidence >= 0.75 {
            CachePriority::High
        } else if confidence >= 0.4 {
            CachePriority::Normal
        } else {
            CachePriority::Low
        }
    }
}

impl PreloadingStrategy for FrequencyBasedPreloadingStrategy {
    fn name(&self) -> &'static str {
        "frequency"
    }

    fn recommendations(
        &self,
        context: &PreloadContext,
        tracker: &AccessTracker,
    ) -> Vec<PreloadRecommendation> {
        if let Some(reason) = self.suppression_reason(context) {
            tracing::debug!(reason, "Preloading suppressed");
            return Vec::new();
        }

        let candidates: Vec<_> = tracker
            .most_frequent(usize::MAX)
            .into_iter()
            .filter(|(_, stats)| stats.total >= self.config.min_frequency)
            .collect();
        let Some(max_total) = candidates.iter().map(|(_, s)| s.total).max() else {
            return Vec::new();
        };

        let now = Instant::now();
        let half_life = self.config.recency_half_life.as_secs_f64().max(f64::EPSILON);
        let offline = context.network_state.connection == ConnectionType::Disconnected;

        let mut recommendations: Vec<PreloadRecommendation> = candidates
            .into_iter()
            .filter_map(|(key, stats)| {
                let frequency = stats.total as f64 / max_total as f64;
                let age = now.saturating_duration_since(stats.last_access).as_secs_f64();
                let recency = 0.5_f64.powf(age / half_life);
                let mut affinity = context.user_activity.affinity(key.cache_type());
                if offline && key.cache_type() == CacheType::AiProcessingResult {
                    affinity *= 0.5;
                }

                let confidence = (frequency * recency * affinity).clamp(0.0, 1.0);
                (confidence >= self.config.min_confidence).then(|| PreloadRecommendation {
                    priority: Self::priority_for(confidence),
                    key,
                    confidence,
                })
            })
            .collect();

        recommendations.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.key.cmp(&b.key))
        });

        let limit = match context.network_state.connection {
            ConnectionType::Cellular => self.config.cellular_limit,
            _ if context.network_state.is_metered => self.config.cellular_limit,
            _ => self.config.max_recommendations,
        };
        recommendations.truncate(limit.min(self.config.max_recommendations));
        recommendations
    }
}

// =============================================================================
// Source
// =============================================================================

/// Produces values for preloaded keys
#[async_trait]
pub trait PreloadSource: Send + Sync {
    /// Load the value for `key`; `Ok(None)` when the source has nothing for it
    async fn load(&self, key: &CacheKey) -> Result<Option<CachedValue>>;
}

/// In-memory source
#[derive(Debug, Default)]
pub struct InMemorySource {
    values: DashMap<CacheKey, CachedValue>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: CacheKey, value: impl Into<CachedValue>) {
        self.values.insert(key, value.into());
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.values.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[async_trait]
impl PreloadSource for InMemorySource {
    async fn load(&self, key: &CacheKey) -> Result<Option<CachedValue>> {
        Ok(self.values.get(key).map(|v| v.clone()))
    }
}

/// Preload execution settings
#[derive(Debug, Clone, PartialEq)]
pub struct PreloadConfig {
    /// Keys loaded concurrently
    pub concurrency: usize,
    /// Per-key load timeout
    pub timeout: Duration,
    /// Preloading stops filling the cache above this utilization
    pub max_utilization: f64,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: Duration::from_secs(2),
            max_utilization: 0.8,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::data::{CacheableNote, Note};
    use crate::cache::tracker::AccessKind;

    fn key(t: CacheType, id: &str) -> CacheKey {
        CacheKey::new(t, id)
    }

    fn busy_tracker() -> AccessTracker {
        let tracker = AccessTracker::new();
        for _ in 0..10 {
            tracker.record(&key(CacheType::NoteContent, "hot"), AccessKind::Hit);
        }
        for _ in 0..3 {
            tracker.record(&key(CacheType::SearchResults, "warm"), AccessKind::Miss);
        }
        tracker.record(&key(CacheType::NoteContent, "once"), AccessKind::Hit);
        tracker
    }

    #[test]
    fn test_recommends_frequent_keys_first() {
        let strategy = FrequencyBasedPreloadingStrategy::new();
        let ctx = PreloadContext::default().with_activity(UserActivity::BrowsingNotes);

        let recs = strategy.recommendations(&ctx, &busy_tracker());
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].key, key(CacheType::NoteContent, "hot"));
        assert_eq!(recs[0].priority, CachePriority::High);
        assert!(recs[0].confidence > recs[1].confidence);
        assert!(recs.iter().all(|r| r.key.identifier() != "once"));
    }

    #[test]
    fn test_activity_changes_ranking() {
        let tracker = AccessTracker::new();
        for _ in 0..4 {
            tracker.record(&key(CacheType::NoteContent, "n"), AccessKind::Hit);
            tracker.record(&key(CacheType::SearchResults, "s"), AccessKind::Hit);
        }
        let strategy = FrequencyBasedPreloadingStrategy::new();

        let browsing = strategy.recommendations(
            &PreloadContext::default().with_activity(UserActivity::BrowsingNotes),
            &tracker,
        );
        let searching = strategy.recommendations(
            &PreloadContext::default().with_activity(UserActivity::Searching),
            &tracker,
        );
        assert_eq!(browsing[0].key.cache_type(), CacheType::NoteContent);
        assert_eq!(searching[0].key.cache_type(), CacheType::SearchResults);
    }

    #[test]
    fn test_suppressed_under_constraints() {
        let strategy = FrequencyBasedPreloadingStrategy::new();
        let tracker = busy_tracker();

        let constrained = [
            PreloadContext::default().with_memory_pressure(MemoryPressure::High),
            PreloadContext::default().with_memory_pressure(MemoryPressure::Critical),
            PreloadContext::default().with_thermal_state(ThermalState::Hot),
            PreloadContext::default().with_battery(0.1),
            PreloadContext {
                device_state: DeviceState {
                    cpu_usage: 0.95,
                    ..Default::default()
                },
                ..Default::default()
            },
        ];
        for ctx in &constrained {
            assert!(strategy.recommendations(ctx, &tracker).is_empty());
        }

        let moderate = PreloadContext::default()
            .with_memory_pressure(MemoryPressure::Moderate)
            .with_thermal_state(ThermalState::Fair);
        assert!(!strategy.recommendations(&moderate, &tracker).is_empty());
    }

    #[test]
    fn test_cellular_caps_recommendations() {
        let tracker = AccessTracker::new();
        for i in 0..20 {
            for _ in 0..3 {
                tracker.record(&key(CacheType::NoteContent, &format!("n{i}")), AccessKind::Hit);
            }
        }
        let strategy = FrequencyBasedPreloadingStrategy::with_config(FrequencyStrategyConfig {
            cellular_limit: 3,
            ..Default::default()
        });

        let wifi = strategy.recommendations(&PreloadContext::default(), &tracker);
        let cellular = strategy.recommendations(
            &PreloadContext::default().with_connection(ConnectionType::Cellular),
            &tracker,
        );
        assert_eq!(wifi.len(), 20);
        assert_eq!(cellular.len(), 3);
    }

    #[test]
    fn test_offline_lowers_ai_results() {
        let tracker = AccessTracker::new();
        for _ in 0..5 {
            tracker.record(&key(CacheType::AiProcessingResult, "h"), AccessKind::Hit);
        }
        let strategy = FrequencyBasedPreloadingStrategy::new();
        let ctx = PreloadContext::default().with_activity(UserActivity::ReviewingAiResults);

        let online = strategy.recommendations(&ctx, &tracker);
        let offline =
            strategy.recommendations(&ctx.with_connection(ConnectionType::Disconnected), &tracker);
        assert!(offline[0].confidence < online[0].confidence);
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let source = InMemorySource::new();
        let k = key(CacheType::NoteContent, "1");
        source.insert(k.clone(), CacheableNote::new(Note::new(1, "t", "c")));

        assert!(source.load(&k).await.unwrap().is_some());
        assert!(source.load(&key(CacheType::NoteContent, "2")).await.unwrap().is_none());
        assert!(source.remove(&k));
        assert!(source.is_empty());
    }

    #[test]
    fn test_fixed_context() {
        let provider = FixedContext(PreloadContext::default().with_battery(0.5));
        assert_eq!(provider.current().battery_level, 0.5);
    }
}
