//! # bale-config
//!
//! Configuration management for bale.
//!
//! Loads configuration from:
//! 1. `~/.bale/config.toml` (global)
//! 2. `.bale/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! The loaded [`Config`] is passed explicitly into the archive engine; there
//! is no process-wide instance.

pub mod logging;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

pub use logging::{init_logging, LogLevel};

/// Default fetch worker count
pub const DEFAULT_WORKERS: usize = 8;

/// Default in-memory limit for a fetched object before it spills to disk (10 MiB).
/// Peak buffer memory is roughly this value times the worker count.
pub const DEFAULT_SPILL_THRESHOLD: usize = 10 * 1024 * 1024;

/// Largest delete batch the object store accepts
pub const MAX_DELETE_BATCH: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub archive: ArchiveConfig,
    pub store: StoreConfig,
    pub log: LogConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self, ConfigError> {
        let global = Self::global_config_path();
        Self::load_from(global.as_deref(), Path::new(".bale/config.toml"))
    }

    /// Load config from an explicit global/project pair, then apply env overrides.
    pub fn load_from(global: Option<&Path>, project: &Path) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(global_path) = global {
            if global_path.exists() {
                debug!("Loading global config from {:?}", global_path);
                let contents = std::fs::read_to_string(global_path)?;
                config = toml::from_str(&contents)?;
            }
        }

        if project.exists() {
            debug!("Loading project config from {:?}", project);
            let contents = std::fs::read_to_string(project)?;
            let project_config: ProjectOverrides = toml::from_str(&contents)?;
            config.merge(project_config);
        }

        config.apply_env_overrides();
        config.archive.normalize();

        Ok(config)
    }

    /// Global config path: ~/.bale/config.toml
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".bale/config.toml"))
    }

    /// Project values replace global ones only where the project file sets them.
    fn merge(&mut self, other: ProjectOverrides) {
        if let Some(archive) = other.archive {
            if let Some(workers) = archive.workers {
                self.archive.workers = workers;
            }
            if let Some(threshold) = archive.spill_threshold {
                self.archive.spill_threshold = threshold;
            }
            if let Some(batch) = archive.delete_batch_size {
                self.archive.delete_batch_size = batch;
            }
        }
        if let Some(store) = other.store {
            if let Some(root) = store.root {
                self.store.root = root;
            }
        }
        if let Some(log) = other.log {
            if let Some(level) = log.level {
                self.log.level = level;
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(workers) = std::env::var("BALE_WORKERS") {
            if let Ok(n) = workers.parse() {
                self.archive.workers = n;
            }
        }
        if let Ok(threshold) = std::env::var("BALE_SPILL_THRESHOLD") {
            if let Ok(n) = threshold.parse() {
                self.archive.spill_threshold = n;
            }
        }
        if let Ok(root) = std::env::var("BALE_STORE_ROOT") {
            self.store.root = PathBuf::from(root);
        }
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

/// Archive engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Maximum number of concurrent object fetches
    pub workers: usize,
    /// Bytes held in memory per fetched object before spilling to a temp file.
    /// Also bounds the chunk size used when validating entry content.
    pub spill_threshold: usize,
    /// Keys per delete request (at most 1000)
    pub delete_batch_size: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            delete_batch_size: MAX_DELETE_BATCH,
        }
    }
}

impl ArchiveConfig {
    /// Clamp values into their usable ranges.
    pub fn normalize(&mut self) {
        self.workers = self.workers.max(1);
        self.spill_threshold = self.spill_threshold.max(1);
        self.delete_batch_size = self.delete_batch_size.clamp(1, MAX_DELETE_BATCH);
    }
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory backing the local object store; one subdirectory per bucket
    pub root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("bale/store"),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of error, warn, info, debug, trace
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

impl LogConfig {
    pub fn level(&self) -> LogLevel {
        LogLevel::from_str(&self.level).unwrap_or(LogLevel::Warn)
    }
}

/// Sparse view of a project config file, so unset keys do not clobber global values.
#[derive(Debug, Default, Deserialize)]
struct ProjectOverrides {
    archive: Option<ArchiveOverrides>,
    store: Option<StoreOverrides>,
    log: Option<LogOverrides>,
}

#[derive(Debug, Default, Deserialize)]
struct ArchiveOverrides {
    workers: Option<usize>,
    spill_threshold: Option<usize>,
    delete_batch_size: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct StoreOverrides {
    root: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct LogOverrides {
    level: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.archive.workers, 8);
        assert_eq!(config.archive.spill_threshold, 10 * 1024 * 1024);
        assert_eq!(config.archive.delete_batch_size, 1000);
        assert_eq!(config.log.level(), LogLevel::Warn);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[archive]"));
        assert!(toml_str.contains("[store]"));
        assert!(toml_str.contains("spill_threshold"));
    }

    #[test]
    fn test_normalize_clamps_batch_size() {
        let mut archive = ArchiveConfig {
            workers: 0,
            spill_threshold: 0,
            delete_batch_size: 5000,
        };
        archive.normalize();
        assert_eq!(archive.workers, 1);
        assert_eq!(archive.spill_threshold, 1);
        assert_eq!(archive.delete_batch_size, MAX_DELETE_BATCH);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.archive.workers, parsed.archive.workers);
        assert_eq!(config.store.root, parsed.store.root);
    }
}
