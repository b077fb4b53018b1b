//! Configuration File
//!
//! YAML settings for the cache. Every field is optional and falls back to the
//! [`CacheConfig`] defaults; durations are given in seconds (milliseconds
//! for the per-key preload timeout).
//!
//! ```yaml
//! max_memory_bytes: 52428800
//! compression:
//!   min_size_bytes: 64
//!   level: 4
//! preload:
//!   concurrency: 4
//!   timeout_ms: 2000
//!   max_utilization: 0.8
//! maintenance:
//!   optimize_interval_secs: 300
//!   preload_interval_secs: 120
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::{
    CacheConfig, CompressionConfig, MaintenanceConfig, PreloadConfig, TrackerConfig,
};
use crate::error::{Error, Result};

/// Highest LZ4 level accepted
pub const MAX_COMPRESSION_LEVEL: i32 = 16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub max_memory_bytes: u64,
    pub blocking_threshold_bytes: u64,
    pub compression: CompressionSettings,
    pub tracker: TrackerSettings,
    pub preload: PreloadSettings,
    pub maintenance: MaintenanceSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompressionSettings {
    pub min_size_bytes: usize,
    pub level: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerSettings {
    pub history_per_key: usize,
    pub max_tracked_keys: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreloadSettings {
    pub concurrency: usize,
    pub timeout_ms: u64,
    pub max_utilization: f64,
}

/// Zero disables the corresponding task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MaintenanceSettings {
    pub optimize_interval_secs: u64,
    pub preload_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl Default for CompressionSettings {
    fn default() -> Self {
        let config = CompressionConfig::default();
        Self {
            min_size_bytes: config.min_size_bytes,
            level: config.level,
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        let config = TrackerConfig::default();
        Self {
            history_per_key: config.history_per_key,
            max_tracked_keys: config.max_tracked_keys,
        }
    }
}

impl Default for PreloadSettings {
    fn default() -> Self {
        let config = PreloadConfig::default();
        Self {
            concurrency: config.concurrency,
            timeout_ms: config.timeout.as_millis() as u64,
            max_utilization: config.max_utilization,
        }
    }
}

impl Default for MaintenanceSettings {
    fn default() -> Self {
        let config = MaintenanceConfig::default();
        Self {
            optimize_interval_secs: config.optimize_interval.as_secs(),
            preload_interval_secs: config.preload_interval.as_secs(),
        }
    }
}

impl From<&CacheConfig> for Settings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            max_memory_bytes: config.max_memory_bytes,
            blocking_threshold_bytes: config.blocking_threshold_bytes,
            compression: CompressionSettings {
                min_size_bytes: config.compression.min_size_bytes,
                level: config.compression.level,
            },
            tracker: TrackerSettings {
                history_per_key: config.tracker.history_per_key,
                max_tracked_keys: config.tracker.max_tracked_keys,
            },
            preload: PreloadSettings {
                concurrency: config.preload.concurrency,
                timeout_ms: config.preload.timeout.as_millis() as u64,
                max_utilization: config.preload.max_utilization,
            },
            maintenance: MaintenanceSettings {
                optimize_interval_secs: config.maintenance.optimize_interval.as_secs(),
                preload_interval_secs: config.maintenance.preload_interval.as_secs(),
            },
        }
    }
}

impl Settings {
    /// Parse settings from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid settings: {e}")))
    }

    /// Read settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml_str(&text)?;
        debug!(path = %path.display(), "Loaded cache settings");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_memory_bytes == 0 {
            return Err(Error::Config("max_memory_bytes must be positive".into()));
        }
        if !(0..=MAX_COMPRESSION_LEVEL).contains(&self.compression.level) {
            return Err(Error::Config(format!(
                "compression.level must be within 0..={MAX_COMPRESSION_LEVEL}, got {}",
                self.compression.level
            )));
        }
        if self.tracker.history_per_key == 0 {
            return Err(Error::Config("tracker.history_per_key must be positive".into()));
        }
        if self.tracker.max_tracked_keys == 0 {
            return Err(Error::Config("tracker.max_tracked_keys must be positive".into()));
        }
        if self.preload.concurrency == 0 {
            return Err(Error::Config("preload.concurrency must be positive".into()));
        }
        if self.preload.timeout_ms == 0 {
            return Err(Error::Config("preload.timeout_ms must be positive".into()));
        }
        let utilization = self.preload.max_utilization;
        if !(utilization > 0.0 && utilization <= 1.0) {
            return Err(Error::Config(format!(
                "preload.max_utilization must be within (0, 1], got {utilization}"
            )));
        }
        Ok(())
    }

    /// Validate and convert into a cache configuration
    pub fn into_cache_config(self) -> Result<CacheConfig> {
        self.validate()?;

        Ok(CacheConfig {
            max_memory_bytes: self.max_memory_bytes,
            blocking_threshold_bytes: self.blocking_threshold_bytes,
            compression: CompressionConfig {
                min_size_bytes: self.compression.min_size_bytes,
                level: self.compression.level,
            },
            tracker: TrackerConfig {
                history_per_key: self.tracker.history_per_key,
                max_tracked_keys: self.tracker.max_tracked_keys,
            },
            preload: PreloadConfig {
                concurrency: self.preload.concurrency,
                timeout: Duration::from_millis(self.preload.timeout_ms),
                max_utilization: self.preload.max_utilization,
            },
            maintenance: MaintenanceConfig {
                optimize_interval: Duration::from_secs(self.maintenance.optimize_interval_secs),
                preload_interval: Duration::from_secs(self.maintenance.preload_interval_secs),
            },
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_empty_document_gives_defaults() {
        let settings = Settings::from_yaml_str("{}").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.into_cache_config().unwrap(), CacheConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let yaml = r#"
max_memory_bytes: 1048576
preload:
  timeout_ms: 500
maintenance:
  preload_interval_secs: 0
"#;
        let config = Settings::from_yaml_str(yaml)
            .unwrap()
            .into_cache_config()
            .unwrap();

        assert_eq!(config.max_memory_bytes, 1_048_576);
        assert_eq!(config.preload.timeout, Duration::from_millis(500));
        assert_eq!(config.preload.concurrency, PreloadConfig::default().concurrency);
        assert!(config.maintenance.preload_interval.is_zero());
        assert_eq!(
            config.maintenance.optimize_interval,
            MaintenanceConfig::default().optimize_interval
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert_matches!(
            Settings::from_yaml_str("max_memory: 10"),
            Err(Error::Config(_))
        );
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.max_memory_bytes = 0;
        assert_matches!(settings.into_cache_config(), Err(Error::Config(_)));

        let mut settings = Settings::default();
        settings.preload.max_utilization = 1.5;
        assert_matches!(settings.validate(), Err(Error::Config(_)));

        let mut settings = Settings::default();
        settings.compression.level = 40;
        assert_matches!(settings.validate(), Err(Error::Config(_)));

        let mut settings = Settings::default();
        settings.preload.concurrency = 0;
        assert_matches!(settings.validate(), Err(Error::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        assert_matches!(
            Settings::load("/nonexistent/voicenote-cache.yaml"),
            Err(Error::Io(_))
        );
    }

    #[test]
    fn test_yaml_roundtrip_through_file() {
        let path = std::env::temp_dir().join(format!("voicenote-cache-{}.yaml", std::process::id()));
        let mut settings = Settings::default();
        settings.max_memory_bytes = 4096;
        std::fs::write(&path, serde_yaml::to_string(&settings).unwrap()).unwrap();

        let loaded = Settings::load(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, settings);
    }
}
