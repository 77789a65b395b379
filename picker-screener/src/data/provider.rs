//! Market data provider abstraction.
//!
//! Defines the `MarketDataProvider` trait the evaluators read through, so the
//! pipeline can run against Tushare in production and in-memory fixtures in
//! tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use super::{Announcement, FundamentalRecord, LargeTradeEntry, MoneyFlowRecord, PriceBar, Security};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    #[error("Network error: {0}")]
    Network(String),

    /// Authentication error (invalid token, insufficient points)
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Rate limit exceeded
    #[error("Rate limited{}", retry_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },

    /// Data not available for the requested security/date
    #[error("Data not available: {0}")]
    DataNotAvailable(String),

    /// Provider is temporarily unavailable
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    /// Invalid request parameters
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Response could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Internal provider error
    #[error("Internal error: {0}")]
    Internal(String),
}

fn retry_suffix(retry_after_secs: &Option<u64>) -> String {
    match retry_after_secs {
        Some(secs) => format!(", retry after {} seconds", secs),
        None => String::new(),
    }
}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying)
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::RateLimited { .. } | Self::Unavailable(_)
        )
    }
}

// ============================================================================
// Market Data Provider Trait
// ============================================================================

/// Read access to the market data the selection pipeline needs.
///
/// Every method may fail or return an empty collection; what that means for
/// a security is decided by the evaluator that made the call.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logging (e.g., "tushare")
    fn name(&self) -> &'static str;

    /// All currently listed securities, in listing order.
    async fn list_securities(&self) -> Result<Vec<Security>, ProviderError>;

    /// Reference metadata for one security.
    async fn security_info(&self, ts_code: &str) -> Result<Option<Security>, ProviderError>;

    /// Daily bars for `[start, end]`, in any order.
    async fn daily_bars(
        &self,
        ts_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError>;

    /// Fundamental-indicator disclosures for a reporting period, latest first.
    async fn fundamental_indicators(
        &self,
        ts_code: &str,
        period: NaiveDate,
    ) -> Result<Vec<FundamentalRecord>, ProviderError>;

    /// Money-flow rows for exactly `date`.
    async fn money_flow(
        &self,
        ts_code: &str,
        date: NaiveDate,
    ) -> Result<Vec<MoneyFlowRecord>, ProviderError>;

    /// The large-trade disclosure list published for `date`.
    async fn large_trade_list(&self, date: NaiveDate) -> Result<Vec<LargeTradeEntry>, ProviderError>;

    /// Announcements published by `ts_code` on `date`.
    async fn announcements(
        &self,
        ts_code: &str,
        date: NaiveDate,
    ) -> Result<Vec<Announcement>, ProviderError>;
}
