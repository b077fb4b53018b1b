//! Maintenance Runtime
//!
//! Background tasks that keep a [`CacheManager`] healthy: a periodic
//! [`optimize`](CacheManager::optimize) sweep and a periodic
//! recommendation-driven preloading pass. Both stop when the handle's
//! cancellation token fires.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::CacheManager;
use super::preload::ContextProvider;

/// Maintenance intervals; a zero interval disables that task
#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceConfig {
    pub optimize_interval: Duration,
    pub preload_interval: Duration,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            optimize_interval: Duration::from_secs(300),
            preload_interval: Duration::from_secs(120),
        }
    }
}

/// Handle to the running maintenance tasks
pub struct MaintenanceHandle {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Token that stops the tasks when cancelled
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Number of spawned tasks
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|t| !t.is_finished())
    }

    /// Cancel the tasks and wait for them to finish
    pub async fn shutdown(self) {
        self.token.cancel();
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!("Maintenance task ended abnormally: {}", e);
            }
        }
        info!("Cache maintenance stopped");
    }
}

pub(crate) fn spawn(
    manager: Arc<CacheManager>,
    context: Arc<dyn ContextProvider>,
    config: MaintenanceConfig,
) -> MaintenanceHandle {
    let token = CancellationToken::new();
    let mut tasks = Vec::new();

    if !config.optimize_interval.is_zero() {
        tasks.push(tokio::spawn(optimize_loop(
            Arc::clone(&manager),
            config.optimize_interval,
            token.child_token(),
        )));
    }

    if config.preload_interval.is_zero() {
        debug!("Scheduled preloading disabled");
    } else if !manager.has_preload_source() {
        debug!("No preload source, scheduled preloading disabled");
    } else {
        tasks.push(tokio::spawn(preload_loop(
            manager,
            context,
            config.preload_interval,
            token.child_token(),
        )));
    }

    info!(tasks = tasks.len(), ?config, "Cache maintenance started");
    MaintenanceHandle { token, tasks }
}

async fn optimize_loop(manager: Arc<CacheManager>, every: Duration, token: CancellationToken) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    tick.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Optimizer shutting down");
                break;
            }
            _ = tick.tick() => {
                let result = manager.optimize().await;
                for error in &result.errors {
                    warn!(key = ?error.key, error = %error.message, "Optimization error");
                }
            }
        }
    }
}

async fn preload_loop(
    manager: Arc<CacheManager>,
    context: Arc<dyn ContextProvider>,
    every: Duration,
    token: CancellationToken,
) {
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!("Preloader shutting down");
                break;
            }
            _ = tick.tick() => {
                let ctx = context.current();
                let result = manager.preload_recommended(&ctx).await;
                if result.loaded > 0 || result.failed > 0 {
                    info!(
                        loaded = result.loaded,
                        skipped = result.skipped,
                        failed = result.failed,
                        "Scheduled preload"
                    );
                }
            }
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
    use crate::cache::entry::{CacheKey, CacheType};
    use crate::cache::manager::CacheConfig;
    use crate::cache::policy::CachePolicy;
    use crate::cache::preload::{FixedContext, InMemorySource};

    fn fast_config() -> CacheConfig {
        let mut config = CacheConfig::default();
        config.maintenance = MaintenanceConfig {
            optimize_interval: Duration::from_millis(10),
            preload_interval: Duration::from_millis(10),
        };
        config
    }

    #[tokio::test]
    async fn test_optimizer_purges_expired_in_background() {
        let manager = Arc::new(CacheManager::new(fast_config()));
        let key = CacheKey::new(CacheType::NoteContent, "1");
        manager
            .cache(
                key,
                CacheableNote::new(Note::new(1, "t", "c")),
                CachePolicy::default().with_ttl(Duration::from_millis(1)),
            )
            .await
            .unwrap();

        let handle = manager.start(Arc::new(FixedContext::default()));
        assert_eq!(handle.task_count(), 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(manager.is_empty());

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_scheduled_preload_restores_hot_keys() {
        let key = CacheKey::new(CacheType::NoteContent, "hot");
        let source = Arc::new(InMemorySource::new());
        source.insert(key.clone(), CacheableNote::new(Note::new(1, "t", "c")));
        let manager = Arc::new(CacheManager::new(fast_config()).with_preload_source(source));

        manager
            .cache(key.clone(), CacheableNote::new(Note::new(1, "t", "c")), CachePolicy::default())
            .await
            .unwrap();
        manager.retrieve(&key).await.unwrap();
        manager.clear_all().await;

        let handle = manager.start(Arc::new(FixedContext::default()));
        assert_eq!(handle.task_count(), 2);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(manager.contains(&key));

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_tasks() {
        let manager = Arc::new(CacheManager::new(fast_config()));
        let handle = manager.start(Arc::new(FixedContext::default()));
        let token = handle.token();
        assert!(handle.is_running());

        handle.shutdown().await;
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_zero_intervals_disable_tasks() {
        let mut config = CacheConfig::default();
        config.maintenance = MaintenanceConfig {
            optimize_interval: Duration::ZERO,
            preload_interval: Duration::ZERO,
        };
        let manager = Arc::new(CacheManager::new(config));

        let handle = manager.start(Arc::new(FixedContext::default()));
        assert_eq!(handle.task_count(), 0);
        handle.shutdown().await;
    }
}
