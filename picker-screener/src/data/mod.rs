//! Market data module for A-shares.
//!
//! Defines the records the factor evaluators consume and the
//! [`MarketDataProvider`] capability that supplies them.
//!
//! # Data Sources
//! - **Tushare Pro** (`TushareAdapter`): daily bars, `daily_basic` turnover,
//!   `fina_indicator`, `moneyflow`, `top_list` and announcements

mod provider;
mod rate_limiter;
mod tushare;

pub use provider::{MarketDataProvider, ProviderError};
pub use rate_limiter::{shared_limiter, RateLimiter, SharedRateLimiter};
pub use tushare::TushareAdapter;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Date format used on the wire by Tushare (`20240105`).
pub const TRADE_DATE_FORMAT: &str = "%Y%m%d";

/// Format a date as `YYYYMMDD`.
pub fn format_trade_date(date: NaiveDate) -> String {
    date.format(TRADE_DATE_FORMAT).to_string()
}

/// Parse a `YYYYMMDD` date.
pub fn parse_trade_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), TRADE_DATE_FORMAT).ok()
}

// ============================================================================
// Reference Data
// ============================================================================

/// A listed security from the scanning universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    /// Exchange-qualified code (e.g., "000001.SZ")
    pub ts_code: String,
    /// Display name (e.g., "平安银行")
    pub name: String,
    /// Industry label, when the listing carries one
    #[serde(default)]
    pub industry: Option<String>,
}

impl Security {
    pub fn new(ts_code: impl Into<String>, name: impl Into<String>, industry: Option<&str>) -> Self {
        Self {
            ts_code: ts_code.into(),
            name: name.into(),
            industry: industry.map(str::to_string),
        }
    }
}

// ============================================================================
// Market Records
// ============================================================================

/// One daily bar. Only the fields the technical factors need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub trade_date: NaiveDate,
    pub close: f64,
    /// Turnover rate (%), absent when the provider lacks the field
    #[serde(default)]
    pub turnover_rate: Option<f64>,
}

/// A fundamental-indicator disclosure for one reporting period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalRecord {
    pub ts_code: String,
    /// Period end the disclosure covers
    pub end_date: Option<NaiveDate>,
    pub pe: Option<f64>,
    pub pb: Option<f64>,
    /// Return on equity (%)
    pub roe: Option<f64>,
}

/// One money-flow row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyFlowRecord {
    pub ts_code: String,
    pub trade_date: NaiveDate,
    /// Net main-capital inflow, signed
    pub net_mf_amount: f64,
}

/// One entry of the daily large-trade disclosure list (龙虎榜).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LargeTradeEntry {
    pub ts_code: String,
    pub trade_date: NaiveDate,
    #[serde(default)]
    pub name: Option<String>,
    /// Disclosure reason as published
    #[serde(default)]
    pub reason: Option<String>,
}

/// A corporate announcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Announcement {
    pub ts_code: String,
    pub ann_date: NaiveDate,
    #[serde(default)]
    pub title: Option<String>,
    /// Body text; announcements without it are not scored
    #[serde(default)]
    pub content: Option<String>,
}

impl Announcement {
    /// The scorable text, if any.
    pub fn text(&self) -> Option<&str> {
        self.content
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}
