//! Configuration management for the F&O scanner.
//!
//! The scanner reads a single configuration file at `~/.fnoscan/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Environment variables (see below)
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `FNO_LOG_LEVEL` / `LOG_LEVEL` → observability.log_level
//! - `MIN_PERCENTAGE_INCREASE` → strategy.min_percentage_increase
//! - `SCAN_INTERVAL_MINUTES` → strategy.scan_interval_minutes
//! - `FYERS_APP_ID` → secrets.fyers.app_id
//! - `FYERS_ACCESS_TOKEN` → secrets.fyers.access_token

use crate::error::{Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".fnoscan"),
        |dirs| dirs.home_dir().join(".fnoscan"),
    )
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration for the scanner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Provider credentials
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Data source cascade and acquisition tunables
    #[serde(default)]
    pub sources: DataSourcesConfig,

    /// Gap-up screening thresholds
    #[serde(default)]
    pub strategy: StrategyConfig,

    /// Raw record plausibility gate
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load() -> Result<Self> {
        let path = config_path();
        if !path.exists() {
            tracing::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config from {}", path.display()))?;

        serde_json::from_str(&content)
            .context(format!("Failed to parse config from {}", path.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("FNO_LOG_LEVEL").or_else(|| lookup("LOG_LEVEL")) {
            self.observability.log_level = level.to_lowercase();
        }

        if let Some(pct) = lookup("MIN_PERCENTAGE_INCREASE").and_then(|v| v.parse().ok()) {
            self.strategy.min_percentage_increase = pct;
        }
        if let Some(mins) = lookup("SCAN_INTERVAL_MINUTES").and_then(|v| v.parse().ok()) {
            self.strategy.scan_interval_minutes = mins;
        }

        if let Some(app_id) = lookup("FYERS_APP_ID").filter(|v| !v.is_empty()) {
            self.secrets.fyers.app_id = Some(app_id);
        }
        if let Some(token) = lookup("FYERS_ACCESS_TOKEN").filter(|v| !v.is_empty()) {
            self.secrets.fyers.access_token = Some(token);
        }
    }

    /// Find an enabled source entry by provider name.
    pub fn source_entry(&self, provider: &str) -> Option<&DataSourceEntry> {
        self.sources
            .sources
            .iter()
            .find(|s| s.provider == provider && s.enabled)
    }

    /// Fyers credentials as `(app_id, access_token)` when both are present.
    pub fn fyers_credentials(&self) -> Option<(String, String)> {
        let fyers = &self.secrets.fyers;
        match (&fyers.app_id, &fyers.access_token) {
            (Some(app_id), Some(token)) if !app_id.is_empty() && !token.is_empty() => {
                Some((app_id.clone(), token.clone()))
            }
            _ => None,
        }
    }
}

// ============================================================================
// Observability
// ============================================================================

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}

// ============================================================================
// Secrets
// ============================================================================

/// Provider credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecretsConfig {
    #[serde(default)]
    pub fyers: FyersSecrets,
}

/// Fyers brokerage API credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FyersSecrets {
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

// ============================================================================
// Data Sources
// ============================================================================

/// Inclusive numeric bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Check whether `value` lies within `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Randomized delay range in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayRange {
    pub const fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    /// A range that never sleeps.
    pub const fn none() -> Self {
        Self::new(0, 0)
    }
}

/// Data source cascade configuration.
///
/// Sources are tried in ascending `priority` order. The shipped defaults
/// mirror the trust ordering: scraped exchange site, exchange toolkit,
/// brokerage API, historical fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourcesConfig {
    /// List of data source configurations
    #[serde(default = "default_source_entries")]
    pub sources: Vec<DataSourceEntry>,

    /// Symbols per acquisition chunk (clamped to 20..=30)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Concurrent workers for cross-source tasks
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Scraped-site session staleness window in seconds
    #[serde(default = "default_session_refresh")]
    pub session_refresh_secs: u64,

    /// Delay between individual calls to one source
    #[serde(default = "default_call_delay")]
    pub call_delay: DelayRange,

    /// Pause between batches sent to one source
    #[serde(default = "default_batch_pause")]
    pub batch_pause: DelayRange,

    /// Offer resolved symbols lacking open interest to later OI-capable sources
    #[serde(default = "default_true")]
    pub complete_open_interest: bool,
}

impl Default for DataSourcesConfig {
    fn default() -> Self {
        Self {
            sources: default_source_entries(),
            batch_size: default_batch_size(),
            max_workers: default_max_workers(),
            request_timeout_secs: default_request_timeout(),
            session_refresh_secs: default_session_refresh(),
            call_delay: default_call_delay(),
            batch_pause: default_batch_pause(),
            complete_open_interest: true,
        }
    }
}

impl DataSourcesConfig {
    /// Effective chunk size after clamping.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE)
    }
}

/// Lower clamp for acquisition chunks.
pub const MIN_BATCH_SIZE: usize = 20;
/// Upper clamp for acquisition chunks.
pub const MAX_BATCH_SIZE: usize = 30;

/// Configuration for a single data source provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceEntry {
    /// Provider name: "nse_api", "nse_toolkit", "fyers", "yfinance"
    pub provider: String,

    /// Whether this provider is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Priority (lower = tried earlier, 1 is first)
    #[serde(default = "default_data_source_priority")]
    pub priority: u8,

    /// Provider-specific configuration (e.g., base_url override)
    #[serde(default)]
    pub config: Option<HashMap<String, serde_json::Value>>,
}

impl DataSourceEntry {
    pub fn new(provider: impl Into<String>, priority: u8) -> Self {
        Self {
            provider: provider.into(),
            enabled: true,
            priority,
            config: None,
        }
    }

    /// Read a string option from the provider-specific config map.
    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.config.as_ref()?.get(key)?.as_str()
    }
}

fn default_source_entries() -> Vec<DataSourceEntry> {
    vec![
        DataSourceEntry::new("nse_api", 1),
        DataSourceEntry::new("nse_toolkit", 2),
        DataSourceEntry::new("fyers", 3),
        DataSourceEntry::new("yfinance", 4),
    ]
}

fn default_batch_size() -> usize {
    25
}

fn default_max_workers() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    15
}

fn default_session_refresh() -> u64 {
    300
}

fn default_call_delay() -> DelayRange {
    DelayRange::new(100, 400)
}

fn default_batch_pause() -> DelayRange {
    DelayRange::new(1000, 2000)
}

fn default_data_source_priority() -> u8 {
    10
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Strategy
// ============================================================================

/// Gap-up screening thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Minimum percentage increase over previous close
    #[serde(default = "default_min_percentage_increase")]
    pub min_percentage_increase: f64,

    /// Volume must exceed this floor
    #[serde(default = "default_min_volume")]
    pub min_volume: u64,

    /// Inclusive LTP sanity band
    #[serde(default = "default_strategy_price_bounds")]
    pub price_bounds: Bounds,

    /// Inclusive gap-up percentage band
    #[serde(default = "default_gap_bounds")]
    pub gap_bounds: Bounds,

    /// Inclusive percentage change band
    #[serde(default = "default_change_bounds")]
    pub change_bounds: Bounds,

    /// Scan cadence for the external scheduler
    #[serde(default = "default_scan_interval")]
    pub scan_interval_minutes: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_percentage_increase: default_min_percentage_increase(),
            min_volume: default_min_volume(),
            price_bounds: default_strategy_price_bounds(),
            gap_bounds: default_gap_bounds(),
            change_bounds: default_change_bounds(),
            scan_interval_minutes: default_scan_interval(),
        }
    }
}

fn default_min_percentage_increase() -> f64 {
    7.0
}

fn default_min_volume() -> u64 {
    1000
}

fn default_strategy_price_bounds() -> Bounds {
    Bounds::new(10.0, 50_000.0)
}

fn default_gap_bounds() -> Bounds {
    Bounds::new(0.1, 25.0)
}

fn default_change_bounds() -> Bounds {
    Bounds::new(-50.0, 100.0)
}

fn default_scan_interval() -> u64 {
    5
}

// ============================================================================
// Validation
// ============================================================================

/// Raw quote plausibility gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Absolute band for every present price field
    #[serde(default = "default_validation_price_bounds")]
    pub price_bounds: Bounds,

    /// Largest trusted `|ltp / prev_close - 1|`
    #[serde(default = "default_max_day_change_ratio")]
    pub max_day_change_ratio: f64,

    /// Reject records without an opening price
    #[serde(default = "default_true")]
    pub require_open_price: bool,

    /// Source tag fragments that mark fabricated rows
    #[serde(default = "default_synthetic_markers")]
    pub synthetic_markers: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            price_bounds: default_validation_price_bounds(),
            max_day_change_ratio: default_max_day_change_ratio(),
            require_open_price: true,
            synthetic_markers: default_synthetic_markers(),
        }
    }
}

fn default_validation_price_bounds() -> Bounds {
    Bounds::new(1.0, 100_000.0)
}

fn default_max_day_change_ratio() -> f64 {
    0.5
}

fn default_synthetic_markers() -> Vec<String> {
    vec!["synthetic".into(), "generated".into(), "fake".into()]
}
