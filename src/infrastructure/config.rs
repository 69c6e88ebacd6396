//! Configuration infrastructure
//!
//! Contains configuration loading and management for playlist collection.
//!
//! Configuration is organized into three sections:
//! 1. Collector tuning (timeouts, scroll steps, convergence policy)
//! 2. Logging
//! 3. The playlists to collect in a batch run

#![allow(clippy::derivable_impls)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{info, warn};

use super::parsing::config::SelectorConfig;

/// Environment variable overriding `collector.headless`
pub const ENV_HEADLESS: &str = "PLAYLIST_COLLECTOR_HEADLESS";

/// Environment variable with comma separated playlist references
pub const ENV_PLAYLIST_IDS: &str = "PLAYLIST_IDS";

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub collector: CollectorConfig,
    pub logging: LoggingConfig,
    /// Playlist ids or URLs, collected in order
    pub playlist_ids: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            collector: CollectorConfig::default(),
            logging: LoggingConfig::default(),
            playlist_ids: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_HEADLESS) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => self.collector.headless = true,
                "0" | "false" | "no" => self.collector.headless = false,
                other => warn!("Ignoring {}={:?}: expected true/false", ENV_HEADLESS, other),
            }
        }

        if let Some(value) = lookup(ENV_PLAYLIST_IDS) {
            let ids: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect();
            if !ids.is_empty() {
                self.playlist_ids = ids;
            }
        }
    }
}

/// Collector tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Passed through to the browser binding
    pub headless: bool,

    /// Wait for the first track row, in milliseconds
    pub wait_timeout_ms: u64,

    /// Pause between scroll steps, in milliseconds
    pub scroll_pause_ms: u64,

    /// Delay after each scroll script so the page can react
    pub scroll_settle_ms: u64,

    /// Delay after the first row appears, before metadata is probed
    pub render_settle_ms: u64,

    /// Short wait per cookie banner selector
    pub cookie_banner_wait_ms: u64,

    /// Wait for the primary cover selector
    pub cover_wait_ms: u64,

    /// Normal scroll increment in pixels
    pub base_scroll_increment: u32,

    /// Increment used when stagnating at the bottom short of the target
    pub boosted_scroll_increment: u32,

    /// Hard ceiling on loop iterations
    pub max_scroll_attempts: u32,

    /// Hard ceiling on loop wall-clock time, in seconds
    pub max_collection_time_secs: u64,

    /// Convergence target when the page gives no item count hint
    pub default_target: u32,

    /// Iterations without new rows that count as stagnation
    pub stagnation_threshold: u32,

    /// Iterations to keep scrolling after the target is first reached
    pub grace_iterations: u32,

    /// Pixels from the end that still count as "at bottom" before scrolling
    pub bottom_tolerance_px: u32,

    /// Tighter tolerance used right after a scroll step
    pub post_scroll_bottom_tolerance_px: u32,

    /// Cap on records kept per playlist in batch runs
    pub max_tracks_per_playlist: Option<usize>,

    pub selectors: SelectorConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            headless: defaults::HEADLESS,
            wait_timeout_ms: defaults::WAIT_TIMEOUT_MS,
            scroll_pause_ms: defaults::SCROLL_PAUSE_MS,
            scroll_settle_ms: defaults::SCROLL_SETTLE_MS,
            render_settle_ms: defaults::RENDER_SETTLE_MS,
            cookie_banner_wait_ms: defaults::COOKIE_BANNER_WAIT_MS,
            cover_wait_ms: defaults::COVER_WAIT_MS,
            base_scroll_increment: defaults::BASE_SCROLL_INCREMENT,
            boosted_scroll_increment: defaults::BOOSTED_SCROLL_INCREMENT,
            max_scroll_attempts: defaults::MAX_SCROLL_ATTEMPTS,
            max_collection_time_secs: defaults::MAX_COLLECTION_TIME_SECS,
            default_target: defaults::DEFAULT_TARGET,
            stagnation_threshold: defaults::STAGNATION_THRESHOLD,
            grace_iterations: defaults::GRACE_ITERATIONS,
            bottom_tolerance_px: defaults::BOTTOM_TOLERANCE_PX,
            post_scroll_bottom_tolerance_px: defaults::POST_SCROLL_BOTTOM_TOLERANCE_PX,
            max_tracks_per_playlist: None,
            selectors: SelectorConfig::default(),
        }
    }
}

impl CollectorConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn scroll_pause(&self) -> Duration {
        Duration::from_millis(self.scroll_pause_ms)
    }

    pub fn scroll_settle(&self) -> Duration {
        Duration::from_millis(self.scroll_settle_ms)
    }

    pub fn render_settle(&self) -> Duration {
        Duration::from_millis(self.render_settle_ms)
    }

    pub fn cookie_banner_wait(&self) -> Duration {
        Duration::from_millis(self.cookie_banner_wait_ms)
    }

    pub fn cover_wait(&self) -> Duration {
        Duration::from_millis(self.cover_wait_ms)
    }

    pub fn max_collection_time(&self) -> Duration {
        Duration::from_secs(self.max_collection_time_secs)
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Directory for log files; next to the executable when unset
    pub directory: Option<PathBuf>,

    /// Log file name inside the log directory
    pub file_name: String,

    /// Module-specific log level filters (e.g., "scraper": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            directory: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters.insert("selectors".to_string(), "warn".to_string());
                filters.insert("tokio".to_string(), "info".to_string());
                filters.insert("playlist_collector".to_string(), defaults::LOG_LEVEL.to_string());
                filters
            },
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get user config directory")?
            .join("playlist-collector");

        Ok(config_dir)
    }

    /// Create a configuration manager for the per-user config file
    pub fn new() -> Result<Self> {
        let config_dir = Self::get_config_dir()?;
        Ok(Self::with_path(config_dir.join("playlist_collector_config.json")))
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub async fn load_config(&self) -> Result<AppConfig> {
        if !self.config_path.exists() {
            info!("Configuration file not found, creating default: {:?}", self.config_path);
            let default_config = AppConfig::default();
            self.save_config(&default_config).await?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(&self.config_path)
            .await
            .context("Failed to read configuration file")?;

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                info!("Loaded configuration from: {:?}", self.config_path);
                Ok(config)
            }
            Err(parse_error) => {
                warn!("⚠️  Configuration parse error: {}", parse_error);
                warn!("⚠️  Resetting to default configuration");

                let backup_path = self.config_path.with_extension("json.corrupted");
                if let Err(e) = fs::copy(&self.config_path, &backup_path).await {
                    warn!("Failed to create backup of corrupted config: {}", e);
                } else {
                    info!("Backed up corrupted config to: {:?}", backup_path);
                }

                let default_config = AppConfig::default();
                self.save_config(&default_config)
                    .await
                    .context("Failed to save default configuration")?;

                info!("✅ Reset to default configuration");
                Ok(default_config)
            }
        }
    }

    /// Save configuration to file
    pub async fn save_config(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;

        fs::write(&self.config_path, content)
            .await
            .context("Failed to write configuration file")?;

        info!("Saved configuration to: {:?}", self.config_path);
        Ok(())
    }

    /// Update collector settings in place
    pub async fn update_collector_config<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut CollectorConfig),
    {
        let mut config = self.load_config().await?;
        updater(&mut config.collector);
        self.save_config(&config).await
    }

    /// Reset configuration to defaults (useful for troubleshooting)
    pub async fn reset_to_defaults(&self) -> Result<AppConfig> {
        info!("🔄 Resetting configuration to defaults");

        let default_config = AppConfig::default();
        self.save_config(&default_config).await?;
        Ok(default_config)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// Default collector configuration values
pub mod defaults {
    pub const HEADLESS: bool = false;

    /// Default wait for the first row (25 seconds)
    pub const WAIT_TIMEOUT_MS: u64 = 25_000;

    pub const SCROLL_PAUSE_MS: u64 = 800;

    pub const SCROLL_SETTLE_MS: u64 = 300;

    pub const RENDER_SETTLE_MS: u64 = 3_000;

    pub const COOKIE_BANNER_WAIT_MS: u64 = 5_000;

    pub const COVER_WAIT_MS: u64 = 5_000;

    pub const BASE_SCROLL_INCREMENT: u32 = 1_200;

    pub const BOOSTED_SCROLL_INCREMENT: u32 = 2_000;

    pub const MAX_SCROLL_ATTEMPTS: u32 = 80;

    /// Ten minutes
    pub const MAX_COLLECTION_TIME_SECS: u64 = 600;

    /// Chart playlists hold 50 tracks
    pub const DEFAULT_TARGET: u32 = 50;

    pub const STAGNATION_THRESHOLD: u32 = 8;

    pub const GRACE_ITERATIONS: u32 = 5;

    pub const BOTTOM_TOLERANCE_PX: u32 = 100;

    pub const POST_SCROLL_BOTTOM_TOLERANCE_PX: u32 = 50;

    // Log configuration defaults
    pub const LOG_LEVEL: &str = "info";

    pub const LOG_JSON_FORMAT: bool = false;

    pub const LOG_CONSOLE_OUTPUT: bool = true;

    pub const LOG_FILE_OUTPUT: bool = false;

    pub const LOG_FILE_NAME: &str = "playlist-collector.log";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_collector_constants() {
        let config = CollectorConfig::default();
        assert_eq!(config.base_scroll_increment, 1_200);
        assert_eq!(config.default_target, 50);
        assert_eq!(config.max_collection_time(), Duration::from_secs(600));
        assert_eq!(config.scroll_pause(), Duration::from_millis(800));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"collector": {"max_scroll_attempts": 12}}"#).unwrap();
        assert_eq!(config.collector.max_scroll_attempts, 12);
        assert_eq!(config.collector.stagnation_threshold, defaults::STAGNATION_THRESHOLD);
        assert!(config.playlist_ids.is_empty());
        assert!(!config.collector.selectors.track_row.row.is_empty());
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        config.apply_overrides_from(|key| match key {
            ENV_HEADLESS => Some("true".to_string()),
            ENV_PLAYLIST_IDS => Some(" a1, ,b2 ".to_string()),
            _ => None,
        });
        assert!(config.collector.headless);
        assert_eq!(config.playlist_ids, vec!["a1".to_string(), "b2".to_string()]);
    }

    #[tokio::test]
    async fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("nested").join("config.json"));

        let config = manager.load_config().await.unwrap();
        assert_eq!(config.collector.max_scroll_attempts, defaults::MAX_SCROLL_ATTEMPTS);
        assert!(manager.config_path().exists());
    }

    #[tokio::test]
    async fn corrupted_file_is_backed_up_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let manager = ConfigManager::with_path(&path);
        let config = manager.load_config().await.unwrap();

        assert_eq!(config.collector.default_target, defaults::DEFAULT_TARGET);
        assert!(path.with_extension("json.corrupted").exists());
    }

    #[tokio::test]
    async fn update_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        manager
            .update_collector_config(|c| c.grace_iterations = 2)
            .await
            .unwrap();
        let reloaded = manager.load_config().await.unwrap();
        assert_eq!(reloaded.collector.grace_iterations, 2);
    }

    #[tokio::test]
    async fn reset_discards_local_changes() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ConfigManager::with_path(dir.path().join("config.json"));

        manager
            .update_collector_config(|c| c.max_scroll_attempts = 3)
            .await
            .unwrap();
        let reset = manager.reset_to_defaults().await.unwrap();

        assert_eq!(reset.collector.max_scroll_attempts, defaults::MAX_SCROLL_ATTEMPTS);
        let reloaded = manager.load_config().await.unwrap();
        assert_eq!(reloaded.collector.max_scroll_attempts, defaults::MAX_SCROLL_ATTEMPTS);
    }
}
