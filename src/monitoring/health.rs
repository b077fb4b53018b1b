//! Health Checks
//!
//! Derives a health verdict for the cache from its metrics. The cache is
//! never fatal to the application, so the worst verdict is `Degraded` for
//! cache-level problems; `Unhealthy` is reserved for a stopped runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::cache::{CacheMetrics, MemoryPressure};

/// Score below which the cache is reported as degraded
pub const DEGRADED_SCORE: f64 = 25.0;

/// Lookups needed before the score is trusted
pub const MIN_LOOKUPS_FOR_SCORE: u64 = 100;

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    /// Serving, but at reduced effectiveness
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Healthy or degraded
    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }

    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "Healthy"),
            HealthStatus::Degraded => write!(f, "Degraded"),
            HealthStatus::Unhealthy => write!(f, "Unhealthy"),
        }
    }
}

/// Result of a single check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
}

impl HealthCheckResult {
    pub fn healthy(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Healthy,
            message: None,
        }
    }

    pub fn degraded(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Degraded,
            message: Some(message.into()),
        }
    }

    pub fn unhealthy(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: HealthStatus::Unhealthy,
            message: Some(message.into()),
        }
    }
}

/// Body of the `/healthz` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Worst status among the checks
    pub status: HealthStatus,
    pub checks: Vec<HealthCheckResult>,
    pub version: String,
    pub uptime_seconds: u64,
}

impl HealthResponse {
    pub fn new(checks: Vec<HealthCheckResult>, uptime: Duration) -> Self {
        let status = checks
            .iter()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);

        Self {
            status,
            checks,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs(),
        }
    }
}

/// Check a metrics snapshot against the memory pressure and score thresholds
pub fn check_metrics(metrics: &CacheMetrics) -> Vec<HealthCheckResult> {
    let pressure = if metrics.memory_pressure == MemoryPressure::Critical {
        HealthCheckResult::degraded(
            "memory_pressure",
            format!(
                "{} of {} budget bytes in use",
                metrics.total_size, metrics.max_size
            ),
        )
    } else {
        HealthCheckResult::healthy("memory_pressure")
    };

    let lookups = metrics.hits + metrics.misses;
    let score = if lookups >= MIN_LOOKUPS_FOR_SCORE && metrics.performance_score < DEGRADED_SCORE {
        HealthCheckResult::degraded(
            "performance",
            format!(
                "score {:.1} (hit rate {:.2})",
                metrics.performance_score, metrics.hit_rate
            ),
        )
    } else {
        HealthCheckResult::healthy("performance")
    };

    let integrity = if metrics.corrupted_count > 0 {
        HealthCheckResult::degraded(
            "integrity",
            format!("{} corrupted entries dropped", metrics.corrupted_count),
        )
    } else {
        HealthCheckResult::healthy("integrity")
    };

    vec![pressure, score, integrity]
}

/// Liveness flag plus metrics-derived checks
pub struct HealthCheck {
    start_time: Instant,
    live: AtomicBool,
}

impl HealthCheck {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            live: AtomicBool::new(true),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    pub fn set_live(&self, live: bool) {
        self.live.store(live, Ordering::Relaxed);
    }

    /// Run every check against the given snapshot
    pub fn check_all(&self, metrics: &CacheMetrics) -> HealthResponse {
        let mut checks = Vec::with_capacity(4);
        checks.push(if self.is_live() {
            HealthCheckResult::healthy("liveness")
        } else {
            HealthCheckResult::unhealthy("liveness", "cache runtime stopped")
        });
        checks.extend(check_metrics(metrics));

        HealthResponse::new(checks, self.uptime())
    }
}

impl Default for HealthCheck {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
