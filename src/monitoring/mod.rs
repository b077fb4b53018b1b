//! Monitoring
//!
//! Prometheus exposition and health checks for a running cache.

mod exporter;
mod health;

pub use exporter::{CacheExporter, METRIC_NAMESPACE};
pub use health::{
    check_metrics, HealthCheck, HealthCheckResult, HealthResponse, HealthStatus, DEGRADED_SCORE,
    MIN_LOOKUPS_FOR_SCORE,
};
