//! Cache Metrics Collection
//!
//! Counters kept under the store lock, lock-free latency averages, and the
//! [`CacheMetrics`] snapshot the manager publishes after every operation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Classification of budget utilization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryPressure {
    #[default]
    Low,
    Moderate,
    High,
    Critical,
}

impl MemoryPressure {
    /// Classify a utilization ratio (used / budget)
    pub fn from_utilization(utilization: f64) -> Self {
        if utilization < 0.5 {
            MemoryPressure::Low
        } else if utilization < 0.75 {
            MemoryPressure::Moderate
        } else if utilization < 0.9 {
            MemoryPressure::High
        } else {
            MemoryPressure::Critical
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MemoryPressure::Low => "low",
            MemoryPressure::Moderate => "moderate",
            MemoryPressure::High => "high",
            MemoryPressure::Critical => "critical",
        }
    }

    /// Gauge value for exporters (0 = low .. 3 = critical)
    pub fn level(&self) -> u8 {
        *self as u8
    }

    fn headroom_score(&self) -> f64 {
        match self {
            MemoryPressure::Low => 1.0,
            MemoryPressure::Moderate => 0.75,
            MemoryPressure::High => 0.4,
            MemoryPressure::Critical => 0.1,
        }
    }
}

impl std::fmt::Display for MemoryPressure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Operation counters. Guarded by the store lock together with the store.
#[derive(Debug, Default, Clone)]
pub(crate) struct StoreStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub decode_failures: u64,
    pub integrity_failures: u64,
}

/// Access latency averages (microseconds, exponential moving average)
#[derive(Debug, Default)]
pub(crate) struct LatencyStats {
    read_us: AtomicU64,
    write_us: AtomicU64,
}

impl LatencyStats {
    pub fn record_read(&self, duration: Duration) {
        update_latency_ema(&self.read_us, duration);
    }

    pub fn record_write(&self, duration: Duration) {
        update_latency_ema(&self.write_us, duration);
    }

    pub fn read(&self) -> Duration {
        Duration::from_micros(self.read_us.load(Ordering::Relaxed))
    }

    pub fn write(&self) -> Duration {
        Duration::from_micros(self.write_us.load(Ordering::Relaxed))
    }
}

fn update_latency_ema(target: &AtomicU64, duration: Duration) {
    let new_us = duration.as_micros().min(u64::MAX as u128) as u64;
    let alpha = 0.1; // EMA smoothing factor

    loop {
        let current = target.load(Ordering::Relaxed);
        let updated = if current == 0 {
            new_us.max(1)
        } else {
            ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
        };

        if target
            .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            break;
        }
    }
}

/// Latency tracker helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking latency
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Point-in-time view of cache health
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub miss_rate: f64,
    pub entry_count: usize,
    /// Logical bytes held (the budgeted figure)
    pub total_size: u64,
    /// Budget in logical bytes
    pub max_size: u64,
    /// Payload bytes actually stored
    pub physical_size: u64,
    pub eviction_count: u64,
    pub expiration_count: u64,
    /// Entries dropped because their payload could not be decoded
    pub corrupted_count: u64,
    /// Logical size / physical size; 1.0 when empty
    pub compression_ratio: f64,
    pub average_access_latency: Duration,
    pub average_write_latency: Duration,
    pub memory_pressure: MemoryPressure,
    /// 0..=100
    pub performance_score: f64,
}

impl CacheMetrics {
    /// Metrics of an empty, unused cache with the given budget
    pub fn empty(max_size: u64) -> Self {
        Self::compute(&StoreStats::default(), 0, 0, max_size, 0, Duration::ZERO, Duration::ZERO)
    }

    pub(crate) fn compute(
        stats: &StoreStats,
        entry_count: usize,
        total_size: u64,
        max_size: u64,
        physical_size: u64,
        read_latency: Duration,
        write_latency: Duration,
    ) -> Self {
        let lookups = stats.hits + stats.misses;
        let (hit_rate, miss_rate) = if lookups == 0 {
            (0.0, 0.0)
        } else {
            let hit = stats.hits as f64 / lookups as f64;
            (hit, 1.0 - hit)
        };

        let compression_ratio = if physical_size == 0 {
            1.0
        } else {
            total_size as f64 / physical_size as f64
        };

        let utilization = if max_size == 0 {
            1.0
        } else {
            total_size as f64 / max_size as f64
        };
        let memory_pressure = MemoryPressure::from_utilization(utilization);

        Self {
            hits: stats.hits,
            misses: stats.misses,
            hit_rate,
            miss_rate,
            entry_count,
            total_size,
            max_size,
            physical_size,
            eviction_count: stats.evictions,
            expiration_count: stats.expirations,
            corrupted_count: stats.decode_failures + stats.integrity_failures,
            compression_ratio,
            average_access_latency: read_latency,
            average_write_latency: write_latency,
            memory_pressure,
            performance_score: performance_score(hit_rate, read_latency, memory_pressure),
        }
    }

    /// Used / budget
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            1.0
        } else {
            self.total_size as f64 / self.max_size as f64
        }
    }
}

/// Weighted 0..=100 health score: hit rate dominates, latency and pressure
/// refine it. One millisecond of average access latency halves the latency term.
pub fn performance_score(hit_rate: f64, latency: Duration, pressure: MemoryPressure) -> f64 {
    let latency_ms = latency.as_secs_f64() * 1000.0;
    let latency_score = 1.0 / (1.0 + latency_ms);
    let score = 0.6 * hit_rate.clamp(0.0, 1.0) + 0.25 * latency_score + 0.15 * pressure.headroom_score();
    (score * 100.0).clamp(0.0, 100.0)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pressure_thresholds() {
        assert_eq!(MemoryPressure::from_utilization(0.0), MemoryPressure::Low);
        assert_eq!(MemoryPressure::from_utilization(0.49), MemoryPressure::Low);
        assert_eq!(MemoryPressure::from_utilization(0.5), MemoryPressure::Moderate);
        assert_eq!(MemoryPressure::from_utilization(0.8), MemoryPressure::High);
        assert_eq!(MemoryPressure::from_utilization(0.9), MemoryPressure::Critical);
        assert!(MemoryPressure::High > MemoryPressure::Moderate);
    }

    #[test]
    fn test_rates() {
        let stats = StoreStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        let m = CacheMetrics::compute(&stats, 2, 400, 1000, 200, Duration::ZERO, Duration::ZERO);

        assert!((m.hit_rate - 0.75).abs() < f64::EPSILON);
        assert!((m.miss_rate - 0.25).abs() < f64::EPSILON);
        assert!((m.compression_ratio - 2.0).abs() < f64::EPSILON);
        assert_eq!(m.memory_pressure, MemoryPressure::Low);
        assert!((m.utilization() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_metrics() {
        let m = CacheMetrics::empty(1024);
        assert_eq!(m.hit_rate, 0.0);
        assert_eq!(m.miss_rate, 0.0);
        assert_eq!(m.compression_ratio, 1.0);
        assert_eq!(m.entry_count, 0);
    }

    #[test]
    fn test_latency_ema() {
        let latency = LatencyStats::default();

        latency.record_read(Duration::from_micros(100));
        assert_eq!(latency.read(), Duration::from_micros(100));

        // EMA should smooth values
        latency.record_read(Duration::from_micros(200));
        let us = latency.read().as_micros();
        assert!(us > 100 && us < 200);
        assert_eq!(latency.write(), Duration::ZERO);
    }

    #[test]
    fn test_performance_score_bounds() {
        let best = performance_score(1.0, Duration::ZERO, MemoryPressure::Low);
        let worst = performance_score(0.0, Duration::from_secs(10), MemoryPressure::Critical);

        assert!((best - 100.0).abs() < 1e-9);
        assert!(worst >= 0.0 && worst < 5.0);
        assert!(
            performance_score(0.9, Duration::from_micros(50), MemoryPressure::Low)
                > performance_score(0.5, Duration::from_micros(50), MemoryPressure::Low)
        );
    }

    #[test]
    fn test_latency_tracker() {
        let tracker = LatencyTracker::start();
        std::thread::sleep(Duration::from_millis(1));
        assert!(tracker.elapsed() >= Duration::from_millis(1));
    }
}
