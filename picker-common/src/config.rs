//! Configuration management for the stock picker.
//!
//! The picker reads `~/.stockpicker/config.json` (plus an optional
//! `secrets.json` next to it, see [`crate::config_loader`]).
//!
//! # Configuration Priority
//!
//! 1. Environment variables
//! 2. Explicit config file values
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `TUSHARE_API_TOKEN` → secrets.tushare_token
//! - `SUPABASE_URL` → secrets.supabase_url
//! - `SUPABASE_KEY` → secrets.supabase_key
//! - `PICKER_LOG_LEVEL` → observability.log_level
//! - `PICKER_LOG_FORMAT` → observability.log_format
//! - `PICKER_DB_PATH` → storage.db_path

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config_loader::load_modular_config;
use crate::error::Error;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    directories::UserDirs::new().map_or_else(
        || PathBuf::from(".stockpicker"),
        |dirs| dirs.home_dir().join(".stockpicker"),
    )
}

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// JSON Schema reference
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Credentials
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Market data provider settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Screening thresholds and scoring
    #[serde(default)]
    pub screener: ScreenerConfig,

    /// Selection persistence
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from the default directory.
    pub fn load() -> Result<Self> {
        Self::load_dir(&config_dir())
    }

    /// Load configuration from `config.json` + `secrets.json` inside `dir`.
    ///
    /// Missing files fall back to defaults.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let value = load_modular_config(Some(dir.to_path_buf()))?;
        serde_json::from_value(value)
            .with_context(|| format!("Failed to parse config from {}", dir.display()))
    }

    /// Load configuration with environment variable overrides.
    pub fn load_with_env() -> Result<Self> {
        let mut config = Self::load()?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TUSHARE_API_TOKEN") {
            self.secrets.tushare_token = Some(token);
        }
        if let Some(url) = lookup("SUPABASE_URL") {
            self.secrets.supabase_url = Some(url);
        }
        if let Some(key) = lookup("SUPABASE_KEY") {
            self.secrets.supabase_key = Some(key);
        }
        if let Some(level) = lookup("PICKER_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        if let Some(format) = lookup("PICKER_LOG_FORMAT") {
            self.observability.log_format = format;
        }
        if let Some(path) = lookup("PICKER_DB_PATH") {
            self.storage.db_path = path;
        }
    }

    /// The Tushare token, or a fatal credential error.
    pub fn tushare_token(&self) -> crate::Result<&str> {
        credential(&self.secrets.tushare_token, "TUSHARE_API_TOKEN")
    }

    pub fn supabase_url(&self) -> crate::Result<&str> {
        credential(&self.secrets.supabase_url, "secrets.supabase_url")
    }

    pub fn supabase_key(&self) -> crate::Result<&str> {
        credential(&self.secrets.supabase_key, "secrets.supabase_key")
    }
}

/// Blank values count as missing.
fn credential<'a>(value: &'a Option<String>, name: &str) -> crate::Result<&'a str> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| Error::MissingCredential(name.to_string()))
}

// ============================================================================
// Observability
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level", alias = "level")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[serde(default = "default_log_format", alias = "format")]
    pub log_format: String,

    /// Additional module targets to set to `warn`.
    #[serde(default)]
    pub excluded_targets: Vec<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            excluded_targets: Vec::new(),
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

/// Credentials for external services.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SecretsConfig {
    /// Tushare Pro API token
    #[serde(default)]
    pub tushare_token: Option<String>,

    /// Supabase project URL (only for the `supabase` storage backend)
    #[serde(default)]
    pub supabase_url: Option<String>,

    /// Supabase service key
    #[serde(default)]
    pub supabase_key: Option<String>,
}

// ============================================================================
// Provider
// ============================================================================

/// Market data provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Tushare API endpoint
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Client-side throttle
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    /// Retries for recoverable failures (network, rate limit, unavailable)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Linear backoff step between retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Merge `daily_basic.turnover_rate` into price bars
    #[serde(default = "default_true")]
    pub fetch_turnover: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            requests_per_minute: default_requests_per_minute(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            fetch_turnover: true,
        }
    }
}

fn default_base_url() -> String {
    "http://api.tushare.pro".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_requests_per_minute() -> u32 {
    200
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Screener
// ============================================================================

/// Gate thresholds, score weights and run shape of the selection pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    /// Industry labels a candidate must belong to
    #[serde(default = "default_hot_industries")]
    pub hot_industries: Vec<String>,

    /// Calendar days of price history requested before the trade date
    #[serde(default = "default_technical_window_days")]
    pub technical_window_days: i64,

    /// Fewer bars than this leave technical factors undefined
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,

    #[serde(default = "default_short_ma")]
    pub short_ma: usize,

    #[serde(default = "default_long_ma")]
    pub long_ma: usize,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// Reject when RSI is above this
    #[serde(default = "default_max_rsi")]
    pub max_rsi: f64,

    /// Reject when a known turnover rate (%) is below this
    #[serde(default = "default_min_turnover")]
    pub min_turnover: f64,

    /// Reject when PE is above this
    #[serde(default = "default_max_pe")]
    pub max_pe: f64,

    /// Reject when ROE (%) is below this
    #[serde(default = "default_min_roe")]
    pub min_roe: f64,

    /// Reject when net main-capital inflow is at or below this
    #[serde(default)]
    pub min_net_inflow: f64,

    /// Reject when announcement sentiment is below this
    #[serde(default = "default_min_sentiment")]
    pub min_sentiment: f64,

    /// Composite score weights
    #[serde(default)]
    pub weights: ScoreWeights,

    /// Number of candidates kept and persisted
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Securities evaluated concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            hot_industries: default_hot_industries(),
            technical_window_days: default_technical_window_days(),
            min_bars: default_min_bars(),
            short_ma: default_short_ma(),
            long_ma: default_long_ma(),
            rsi_period: default_rsi_period(),
            max_rsi: default_max_rsi(),
            min_turnover: default_min_turnover(),
            max_pe: default_max_pe(),
            min_roe: default_min_roe(),
            min_net_inflow: 0.0,
            min_sentiment: default_min_sentiment(),
            weights: ScoreWeights::default(),
            top_k: default_top_k(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_hot_industries() -> Vec<String> {
    ["计算机", "半导体", "新能源", "AI", "汽车"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_technical_window_days() -> i64 {
    40
}

fn default_min_bars() -> usize {
    20
}

fn default_short_ma() -> usize {
    5
}

fn default_long_ma() -> usize {
    20
}

fn default_rsi_period() -> usize {
    14
}

fn default_max_rsi() -> f64 {
    70.0
}

fn default_min_turnover() -> f64 {
    1.0
}

fn default_max_pe() -> f64 {
    20.0
}

fn default_min_roe() -> f64 {
    10.0
}

fn default_min_sentiment() -> f64 {
    0.8
}

fn default_top_k() -> usize {
    5
}

fn default_concurrency() -> usize {
    4
}

/// Weights of the composite score:
/// `golden_cross + roe * roe / roe_scale + inflow * net_inflow / inflow_scale + sentiment * s`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub golden_cross: f64,
    pub roe: f64,
    pub roe_scale: f64,
    pub inflow: f64,
    pub inflow_scale: f64,
    pub sentiment: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            golden_cross: 1.0,
            roe: 0.5,
            roe_scale: 20.0,
            inflow: 0.5,
            inflow_scale: 1_000_000.0,
            sentiment: 0.5,
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

/// Where the daily selection is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `sqlite` or `supabase`
    #[serde(default = "default_backend")]
    pub backend: String,

    /// SQLite database path (`~` is expanded)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Table holding one row per (trade_date, ts_code)
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            db_path: default_db_path(),
            table: default_table(),
        }
    }
}

impl StorageConfig {
    /// The database path with `~` and environment variables expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        match shellexpand::full(&self.db_path) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(_) => PathBuf::from(&self.db_path),
        }
    }
}

fn default_backend() -> String {
    "sqlite".into()
}

fn default_db_path() -> String {
    "~/.stockpicker/picker.db".into()
}

fn default_table() -> String {
    "selected_stocks".into()
}
