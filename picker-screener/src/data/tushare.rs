//! Tushare Pro API adapter for A-share market data.
//!
//! # API Documentation
//! https://tushare.pro/document/2
//!
//! Every call is a JSON POST of `{api_name, token, params, fields}`. The
//! response carries a column list and positional rows:
//!
//! ```text
//! {"code":0,"msg":"","data":{"fields":["ts_code","close"],"items":[["000001.SZ",10.5]]}}
//! ```
//!
//! # Rate Limits
//! - Basic: 200 requests/minute per API
//!
//! Retries for recoverable failures happen here and nowhere else.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

use picker_common::config::ProviderConfig;

use super::provider::{MarketDataProvider, ProviderError};
use super::rate_limiter::{shared_limiter, SharedRateLimiter};
use super::{
    format_trade_date, parse_trade_date, Announcement, FundamentalRecord, LargeTradeEntry,
    MoneyFlowRecord, PriceBar, Security,
};

/// Tushare error code for an invalid or expired token.
const CODE_INVALID_TOKEN: i64 = 40101;
/// Tushare error code for per-minute quota exhaustion.
const CODE_RATE_LIMITED: i64 = 40203;

/// Tushare API adapter
pub struct TushareAdapter {
    /// API token
    token: String,
    /// HTTP client
    client: reqwest::Client,
    /// API base URL
    base_url: String,
    limiter: SharedRateLimiter,
    max_retries: u32,
    retry_backoff: Duration,
    /// Merge `daily_basic.turnover_rate` into daily bars
    fetch_turnover: bool,
}

impl TushareAdapter {
    /// Create a new Tushare adapter with default provider settings
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_config(token, &ProviderConfig::default())
    }

    /// Create from provider settings
    pub fn with_config(token: impl Into<String>, config: &ProviderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let limiter = shared_limiter("tushare", config.requests_per_minute);
        debug!(
            requests_per_minute = config.requests_per_minute,
            burst = limiter.capacity(),
            "Tushare rate limiter ready"
        );

        Self {
            token: token.into(),
            client,
            base_url: config.base_url.clone(),
            limiter,
            max_retries: config.max_retries,
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            fetch_turnover: config.fetch_turnover,
        }
    }

    /// Create from the full configuration; fails when no token is configured.
    pub fn from_config(config: &picker_common::Config) -> picker_common::Result<Self> {
        let token = config.tushare_token()?;
        Ok(Self::with_config(token, &config.provider))
    }

    /// Call a Tushare API, retrying recoverable failures with linear backoff.
    async fn call_api(
        &self,
        api_name: &str,
        params: &[(&str, String)],
        fields: &[&str],
    ) -> Result<TushareTable, ProviderError> {
        let mut attempt = 0;
        loop {
            self.limiter.acquire().await;

            match self.call_once(api_name, params, fields).await {
                Ok(table) => return Ok(table),
                Err(e) if e.is_recoverable() && attempt < self.max_retries => {
                    attempt += 1;
                    let backoff = self.retry_backoff * attempt;
                    warn!(
                        api = api_name,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Tushare call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_once(
        &self,
        api_name: &str,
        params: &[(&str, String)],
        fields: &[&str],
    ) -> Result<TushareTable, ProviderError> {
        let request = TushareRequest {
            api_name,
            token: &self.token,
            params: params.iter().map(|(k, v)| (*k, v.as_str())).collect(),
            fields: fields.join(","),
        };

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: None,
            });
        }
        if status.is_server_error() {
            return Err(ProviderError::Unavailable(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidRequest(format!("HTTP {} - {}", status, body)));
        }

        let result: TushareResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        result.into_table(api_name)
    }
}

#[async_trait]
impl MarketDataProvider for TushareAdapter {
    fn name(&self) -> &'static str {
        "tushare"
    }

    async fn list_securities(&self) -> Result<Vec<Security>, ProviderError> {
        let params = [("exchange", String::new()), ("list_status", "L".to_string())];
        let table = self
            .call_api("stock_basic", &params, &["ts_code", "name", "industry"])
            .await?;

        Ok(table.securities())
    }

    async fn security_info(&self, ts_code: &str) -> Result<Option<Security>, ProviderError> {
        let params = [("ts_code", ts_code.to_string())];
        let table = self
            .call_api("stock_basic", &params, &["ts_code", "name", "industry"])
            .await?;

        Ok(table.first_security())
    }

    async fn daily_bars(
        &self,
        ts_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        let params = [
            ("ts_code", ts_code.to_string()),
            ("start_date", format_trade_date(start)),
            ("end_date", format_trade_date(end)),
        ];

        let table = self
            .call_api("daily", &params, &["ts_code", "trade_date", "close"])
            .await?;

        let mut bars: Vec<PriceBar> = table
            .rows()
            .filter_map(|row| {
                Some(PriceBar {
                    trade_date: row.date("trade_date")?,
                    close: row.f64("close")?,
                    turnover_rate: None,
                })
            })
            .collect();

        if self.fetch_turnover && !bars.is_empty() {
            match self
                .call_api("daily_basic", &params, &["ts_code", "trade_date", "turnover_rate"])
                .await
            {
                Ok(basic) => {
                    let turnover: HashMap<NaiveDate, f64> = basic
                        .rows()
                        .filter_map(|row| Some((row.date("trade_date")?, row.f64("turnover_rate")?)))
                        .collect();
                    for bar in &mut bars {
                        bar.turnover_rate = turnover.get(&bar.trade_date).copied();
                    }
                }
                Err(e) => {
                    debug!(ts_code, error = %e, "daily_basic unavailable, turnover left empty");
                }
            }
        }

        bars.sort_by_key(|b| b.trade_date);
        Ok(bars)
    }

    async fn fundamental_indicators(
        &self,
        ts_code: &str,
        period: NaiveDate,
    ) -> Result<Vec<FundamentalRecord>, ProviderError> {
        let params = [
            ("ts_code", ts_code.to_string()),
            ("period", format_trade_date(period)),
        ];

        let table = self
            .call_api("fina_indicator", &params, &["ts_code", "end_date", "pe", "pb", "roe"])
            .await?;

        Ok(table
            .rows()
            .map(|row| FundamentalRecord {
                ts_code: row.str("ts_code").unwrap_or(ts_code).to_string(),
                end_date: row.date("end_date"),
                pe: row.f64("pe"),
                pb: row.f64("pb"),
                roe: row.f64("roe"),
            })
            .collect())
    }

    async fn money_flow(
        &self,
        ts_code: &str,
        date: NaiveDate,
    ) -> Result<Vec<MoneyFlowRecord>, ProviderError> {
        let day = format_trade_date(date);
        let params = [
            ("ts_code", ts_code.to_string()),
            ("start_date", day.clone()),
            ("end_date", day),
        ];

        let table = self
            .call_api("moneyflow", &params, &["ts_code", "trade_date", "net_mf_amount"])
            .await?;

        Ok(table
            .rows()
            .filter_map(|row| {
                Some(MoneyFlowRecord {
                    ts_code: row.str("ts_code").unwrap_or(ts_code).to_string(),
                    trade_date: row.date("trade_date").unwrap_or(date),
                    net_mf_amount: row.f64("net_mf_amount")?,
                })
            })
            .collect())
    }

    async fn large_trade_list(&self, date: NaiveDate) -> Result<Vec<LargeTradeEntry>, ProviderError> {
        let params = [("trade_date", format_trade_date(date))];

        let table = self
            .call_api("top_list", &params, &["trade_date", "ts_code", "name", "reason"])
            .await?;

        Ok(table
            .rows()
            .filter_map(|row| {
                Some(LargeTradeEntry {
                    ts_code: row.str("ts_code")?.to_string(),
                    trade_date: row.date("trade_date").unwrap_or(date),
                    name: row.str("name").map(str::to_string),
                    reason: row.str("reason").map(str::to_string),
                })
            })
            .collect())
    }

    async fn announcements(
        &self,
        ts_code: &str,
        date: NaiveDate,
    ) -> Result<Vec<Announcement>, ProviderError> {
        let day = format_trade_date(date);
        let params = [
            ("ts_code", ts_code.to_string()),
            ("start_date", day.clone()),
            ("end_date", day),
        ];

        let table = self
            .call_api("anns", &params, &["ts_code", "ann_date", "title", "content"])
            .await?;

        Ok(table
            .rows()
            .map(|row| Announcement {
                ts_code: row.str("ts_code").unwrap_or(ts_code).to_string(),
                ann_date: row.date("ann_date").unwrap_or(date),
                title: row.str("title").map(str::to_string),
                content: row.str("content").map(str::to_string),
            })
            .collect())
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct TushareRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    params: HashMap<&'a str, &'a str>,
    fields: String,
}

#[derive(Debug, Deserialize)]
struct TushareResponse {
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<TushareTable>,
}

impl TushareResponse {
    fn into_table(self, api_name: &str) -> Result<TushareTable, ProviderError> {
        let msg = self.msg.unwrap_or_default();
        match self.code {
            0 => Ok(self.data.unwrap_or_default()),
            CODE_INVALID_TOKEN => Err(ProviderError::Auth(msg)),
            CODE_RATE_LIMITED => Err(ProviderError::RateLimited {
                retry_after_secs: Some(60),
            }),
            code => Err(ProviderError::InvalidRequest(format!(
                "{} returned {}: {}",
                api_name, code, msg
            ))),
        }
    }
}

/// Column-oriented result set.
#[derive(Debug, Default, Deserialize)]
struct TushareTable {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

impl TushareTable {
    fn rows(&self) -> impl Iterator<Item = TushareRow<'_>> {
        let index: HashMap<&str, usize> = self
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.as_str(), i))
            .collect();
        let index = std::rc::Rc::new(index);

        self.items.iter().map(move |values| TushareRow {
            index: std::rc::Rc::clone(&index),
            values,
        })
    }

    fn securities(&self) -> Vec<Security> {
        self.rows().filter_map(|row| row.to_security()).collect()
    }

    /// The row iterator borrows `self`, so the result is bound before returning.
    #[allow(clippy::let_and_return)]
    fn first_security(&self) -> Option<Security> {
        let found = self.rows().find_map(|row| row.to_security());
        found
    }
}

struct TushareRow<'a> {
    index: std::rc::Rc<HashMap<&'a str, usize>>,
    values: &'a [Value],
}

impl<'a> TushareRow<'a> {
    fn get(&self, field: &str) -> Option<&'a Value> {
        self.index.get(field).and_then(|&i| self.values.get(i))
    }

    fn str(&self, field: &str) -> Option<&'a str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Numbers may arrive as JSON numbers or numeric strings.
    fn f64(&self, field: &str) -> Option<f64> {
        let value = match self.get(field)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }

    fn date(&self, field: &str) -> Option<NaiveDate> {
        self.str(field).and_then(parse_trade_date)
    }

    fn to_security(&self) -> Option<Security> {
        Some(Security {
            ts_code: self.str("ts_code")?.to_string(),
            name: self.str("name").unwrap_or_default().to_string(),
            industry: self
                .str("industry")
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
