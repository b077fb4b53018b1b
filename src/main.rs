//! Voice Notes Cache Simulator
//!
//! Runs a seeded voice-notes workload against a configured cache, with the
//! maintenance runtime enabled, and prints the final metrics as JSON.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Cache Simulator                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │   Workload   │───▶│    Cache     │───▶│   Exporter   │       │
//! │  │  (seeded)    │    │   Manager    │    │  /metrics    │       │
//! │  │              │    │ + maintenance│    │  /healthz    │       │
//! │  └──────────────┘    └──────────────┘    └──────────────┘       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use voicenote_cache::cache::{
    CacheManager, CacheMetrics, EvictionStrategy, FixedContext, PreloadContext, UserActivity,
};
use voicenote_cache::config::Settings;
use voicenote_cache::monitoring::{CacheExporter, HealthCheck};
use voicenote_cache::workload::{Workload, WorkloadConfig, WorkloadSummary};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Voice notes cache simulator - tune budgets and eviction strategies
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// YAML settings file
    #[arg(long, env = "VOICENOTE_CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Budget in logical bytes (overrides the settings file)
    #[arg(long, env = "VOICENOTE_CACHE_BUDGET")]
    budget: Option<u64>,

    /// Eviction strategy applied to every write (lru, lfu, fifo, ttl)
    #[arg(long, env = "VOICENOTE_CACHE_STRATEGY")]
    strategy: Option<EvictionStrategy>,

    /// Workload seed
    #[arg(long, env = "VOICENOTE_CACHE_SEED", default_value = "42")]
    seed: u64,

    /// Operations to simulate
    #[arg(long, env = "VOICENOTE_CACHE_OPERATIONS", default_value = "10000")]
    operations: usize,

    /// Notes in the backing store
    #[arg(long, env = "VOICENOTE_CACHE_NOTES", default_value = "2000")]
    notes: usize,

    /// Metrics reporting interval in seconds (0 disables)
    #[arg(long, env = "VOICENOTE_CACHE_REPORT_SECONDS", default_value = "5")]
    report_interval_seconds: u64,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<SocketAddr>,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR")]
    health_addr: Option<SocketAddr>,

    /// Keep serving metrics after the workload until interrupted
    #[arg(long, env = "VOICENOTE_CACHE_SERVE")]
    serve: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

/// Final output
#[derive(Serialize)]
struct Report<'a> {
    settings: &'a Settings,
    workload: &'a WorkloadSummary,
    metrics: &'a CacheMetrics,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(budget) = args.budget {
        settings.max_memory_bytes = budget;
    }
    let cache_config = settings
        .clone()
        .into_cache_config()
        .context("invalid cache settings")?;

    info!("Starting voice notes cache simulator");
    info!("  Budget: {} bytes", cache_config.max_memory_bytes);
    info!(
        "  Strategy override: {}",
        args.strategy.map_or("none", |s| s.name())
    );
    info!("  Operations: {} (seed {})", args.operations, args.seed);

    let mut workload = Workload::new(WorkloadConfig {
        operations: args.operations,
        seed: args.seed,
        note_count: args.notes,
        strategy: args.strategy,
        ..WorkloadConfig::default()
    });

    let manager = Arc::new(CacheManager::new(cache_config).with_preload_source(workload.source()));
    let context = Arc::new(FixedContext(
        PreloadContext::default().with_activity(UserActivity::BrowsingNotes),
    ));
    let maintenance = manager.start(context);

    let shutdown = CancellationToken::new();
    let exporter = Arc::new(CacheExporter::new().context("failed to create metrics exporter")?);
    let health = Arc::new(HealthCheck::new());

    tokio::spawn(Arc::clone(&exporter).run(Arc::clone(&manager), shutdown.child_token()));

    if let Some(addr) = args.health_addr {
        let (manager, health) = (Arc::clone(&manager), Arc::clone(&health));
        tokio::spawn(async move {
            if let Err(e) = run_health_server(addr, manager, health).await {
                error!("Health server error: {:#}", e);
            }
        });
    }

    if let Some(addr) = args.metrics_addr {
        let exporter = Arc::clone(&exporter);
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(addr, exporter).await {
                error!("Metrics server error: {:#}", e);
            }
        });
    }

    if args.report_interval_seconds > 0 {
        tokio::spawn(report_metrics(
            Arc::clone(&manager),
            Duration::from_secs(args.report_interval_seconds),
            shutdown.child_token(),
        ));
    }

    let summary = workload.run(&manager).await;

    if args.serve {
        info!("Workload done, serving until interrupted");
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for interrupt")?;
    }

    shutdown.cancel();
    maintenance.shutdown().await;
    health.set_live(false);

    let metrics = manager.metrics_snapshot();
    let report = Report {
        settings: &settings,
        workload: &summary,
        metrics: &metrics,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    info!("Simulator shutdown complete");
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "hyper_util=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Logs go to stderr so the JSON report on stdout stays clean
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

async fn report_metrics(manager: Arc<CacheManager>, every: Duration, token: CancellationToken) {
    let mut tick = tokio::time::interval(every);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {
                let m = manager.metrics_snapshot();
                info!(
                    entries = m.entry_count,
                    total_size = m.total_size,
                    hit_rate = m.hit_rate,
                    evictions = m.eviction_count,
                    pressure = %m.memory_pressure,
                    score = m.performance_score,
                    "Cache metrics"
                );
            }
        }
    }
}

// =============================================================================
// HTTP Servers
// =============================================================================

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn not_found() -> Response<Full<Bytes>> {
    respond(StatusCode::NOT_FOUND, "text/plain", "not found")
}

async fn serve<F>(addr: SocketAddr, name: &'static str, handler: F) -> anyhow::Result<()>
where
    F: Fn(Request<hyper::body::Incoming>) -> Response<Full<Bytes>> + Clone + Send + Sync + 'static,
{
    use hyper::server::conn::http1;
    use hyper::service::service_fn;
    use hyper_util::rt::TokioIo;
    use tokio::net::TcpListener;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {name} server on {addr}"))?;

    info!("{} server listening on {}", name, addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .with_context(|| format!("{name} server accept error"))?;

        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let response = handler(req);
                async move { Ok::<_, std::convert::Infallible>(response) }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("{} server connection error: {}", name, e);
            }
        });
    }
}

async fn run_health_server(
    addr: SocketAddr,
    manager: Arc<CacheManager>,
    health: Arc<HealthCheck>,
) -> anyhow::Result<()> {
    serve(addr, "Health", move |req| match req.uri().path() {
        "/healthz" => {
            let report = health.check_all(&manager.metrics_snapshot());
            let status = if report.status.is_operational() {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            match serde_json::to_vec(&report) {
                Ok(body) => respond(status, "application/json", body),
                Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string()),
            }
        }
        "/livez" if health.is_live() => respond(StatusCode::OK, "text/plain", "ok"),
        "/livez" => respond(StatusCode::SERVICE_UNAVAILABLE, "text/plain", "stopped"),
        _ => not_found(),
    })
    .await
}

async fn run_metrics_server(addr: SocketAddr, exporter: Arc<CacheExporter>) -> anyhow::Result<()> {
    serve(addr, "Metrics", move |req| match req.uri().path() {
        "/metrics" => match exporter.encode() {
            Ok(text) => respond(StatusCode::OK, prometheus::TEXT_FORMAT, text),
            Err(e) => respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", e.to_string()),
        },
        _ => not_found(),
    })
    .await
}
