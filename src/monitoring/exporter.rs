//! Prometheus Exporter
//!
//! Mirrors [`CacheMetrics`] snapshots into a dedicated prometheus registry.
//! Rates, sizes and latencies are gauges; hit, miss, eviction, expiration and
//! corruption totals are counters advanced by the difference between
//! consecutive snapshots.

use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cache::{CacheManager, CacheMetrics};
use crate::error::{Error, Result};

/// Prefix of every exported metric
pub const METRIC_NAMESPACE: &str = "voicenote_cache";

/// Last counter values seen, used to derive increments
#[derive(Debug, Default)]
struct CounterMarks {
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
    corrupted: u64,
}

/// Cache metrics in prometheus form
pub struct CacheExporter {
    registry: Registry,

    hit_rate: Gauge,
    entries: IntGauge,
    logical_bytes: IntGauge,
    budget_bytes: IntGauge,
    physical_bytes: IntGauge,
    compression_ratio: Gauge,
    read_latency_seconds: Gauge,
    write_latency_seconds: Gauge,
    memory_pressure: IntGauge,
    performance_score: Gauge,

    hits: IntCounter,
    misses: IntCounter,
    evictions: IntCounter,
    expirations: IntCounter,
    corrupted: IntCounter,

    marks: Mutex<CounterMarks>,
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge> {
    let metric = Gauge::new(name, help).map_err(metric_error)?;
    registry.register(Box::new(metric.clone())).map_err(metric_error)?;
    Ok(metric)
}

fn int_gauge(registry: &Registry, name: &str, help: &str) -> Result<IntGauge> {
    let metric = IntGauge::new(name, help).map_err(metric_error)?;
    registry.register(Box::new(metric.clone())).map_err(metric_error)?;
    Ok(metric)
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let metric = IntCounter::new(name, help).map_err(metric_error)?;
    registry.register(Box::new(metric.clone())).map_err(metric_error)?;
    Ok(metric)
}

fn metric_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("prometheus: {e}"))
}

impl CacheExporter {
    /// Create an exporter with its own registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some(METRIC_NAMESPACE.to_string()), None)
            .map_err(metric_error)?;

        Ok(Self {
            hit_rate: gauge(&registry, "hit_rate", "Fraction of lookups served from the cache")?,
            entries: int_gauge(&registry, "entries", "Number of cached entries")?,
            logical_bytes: int_gauge(&registry, "logical_bytes", "Logical bytes held against the budget")?,
            budget_bytes: int_gauge(&registry, "budget_bytes", "Budget in logical bytes")?,
            physical_bytes: int_gauge(&registry, "physical_bytes", "Payload bytes actually stored")?,
            compression_ratio: gauge(&registry, "compression_ratio", "Logical size over physical size")?,
            read_latency_seconds: gauge(
                &registry,
                "read_latency_seconds",
                "Moving average of retrieve latency",
            )?,
            write_latency_seconds: gauge(
                &registry,
                "write_latency_seconds",
                "Moving average of cache write latency",
            )?,
            memory_pressure: int_gauge(
                &registry,
                "memory_pressure",
                "Budget pressure level (0 low, 1 moderate, 2 high, 3 critical)",
            )?,
            performance_score: gauge(&registry, "performance_score", "Composite health score, 0 to 100")?,
            hits: counter(&registry, "hits_total", "Lookups served from the cache")?,
            misses: counter(&registry, "misses_total", "Lookups not served from the cache")?,
            evictions: counter(&registry, "evictions_total", "Entries evicted to make room")?,
            expirations: counter(&registry, "expirations_total", "Entries dropped after their TTL")?,
            corrupted: counter(&registry, "corrupted_total", "Entries dropped with undecodable payloads")?,
            marks: Mutex::new(CounterMarks::default()),
            registry,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Apply one metrics snapshot
    pub fn observe(&self, metrics: &CacheMetrics) {
        self.hit_rate.set(metrics.hit_rate);
        self.entries.set(metrics.entry_count as i64);
        self.logical_bytes.set(metrics.total_size as i64);
        self.budget_bytes.set(metrics.max_size as i64);
        self.physical_bytes.set(metrics.physical_size as i64);
        self.compression_ratio.set(metrics.compression_ratio);
        self.read_latency_seconds.set(metrics.average_access_latency.as_secs_f64());
        self.write_latency_seconds.set(metrics.average_write_latency.as_secs_f64());
        self.memory_pressure.set(metrics.memory_pressure.level() as i64);
        self.performance_score.set(metrics.performance_score);

        let mut marks = self.marks.lock();
        advance(&self.hits, &mut marks.hits, metrics.hits);
        advance(&self.misses, &mut marks.misses, metrics.misses);
        advance(&self.evictions, &mut marks.evictions, metrics.eviction_count);
        advance(&self.expirations, &mut marks.expirations, metrics.expiration_count);
        advance(&self.corrupted, &mut marks.corrupted, metrics.corrupted_count);
    }

    /// Render the registry in the text exposition format
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metric_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics encoding: {e}")))
    }

    /// Follow the manager's metrics until cancelled
    pub async fn run(self: Arc<Self>, manager: Arc<CacheManager>, token: CancellationToken) {
        self.observe(&manager.metrics_snapshot());
        let mut updates = Box::pin(manager.metrics_stream());

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Metrics exporter shutting down");
                    break;
                }
                next = updates.next() => match next {
                    Some(metrics) => self.observe(&metrics),
                    None => break,
                },
            }
        }
    }
}

/// Counters only move forward; a lower reading moves the mark without
/// touching the counter.
fn advance(counter: &IntCounter, mark: &mut u64, current: u64) {
    if current > *mark {
        counter.inc_by(current - *mark);
    }
    *mark = current;
}

impl std::fmt::Debug for CacheExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheExporter")
            .field("namespace", &METRIC_NAMESPACE)
            .field("entries", &self.entries.get())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheConfig, CacheKey, CachePolicy, CacheType, CacheableNote, Note};
    use std::time::Duration;

    #[test]
    fn test_observe_sets_gauges() {
        let exporter = CacheExporter::new().unwrap();
        let mut metrics = CacheMetrics::empty(1_000);
        metrics.entry_count = 3;
        metrics.total_size = 600;
        metrics.hits = 4;
        metrics.misses = 1;

        exporter.observe(&metrics);

        let text = exporter.encode().unwrap();
        assert!(text.contains("voicenote_cache_entries 3"));
        assert!(text.contains("voicenote_cache_logical_bytes 600"));
        assert!(text.contains("voicenote_cache_budget_bytes 1000"));
        assert!(text.contains("voicenote_cache_hits_total 4"));
    }

    #[test]
    fn test_counters_follow_deltas() {
        let exporter = CacheExporter::new().unwrap();
        let mut metrics = CacheMetrics::empty(1_000);

        metrics.hits = 5;
        exporter.observe(&metrics);
        metrics.hits = 8;
        exporter.observe(&metrics);
        assert_eq!(exporter.hits.get(), 8);

        // A lower reading never rewinds the counter
        metrics.hits = 7;
        exporter.observe(&metrics);
        assert_eq!(exporter.hits.get(), 8);
        metrics.hits = 9;
        exporter.observe(&metrics);
        assert_eq!(exporter.hits.get(), 10);
    }

    #[tokio::test]
    async fn test_run_follows_manager() {
        let manager = Arc::new(CacheManager::new(CacheConfig::with_budget(10_000)));
        let exporter = Arc::new(CacheExporter::new().unwrap());
        let token = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&exporter).run(Arc::clone(&manager), token.clone()));

        manager
            .cache(
                CacheKey::new(CacheType::NoteContent, "1"),
                CacheableNote::new(Note::new(1, "t", "content")),
                CachePolicy::default(),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(exporter.entries.get(), 1);

        token.cancel();
        task.await.unwrap();
    }
}
