//! Membership in the daily large-trade disclosure list (龙虎榜).
//!
//! The list is fetched at most once per date within a run and shared
//! read-only by every concurrent evaluation. A failed fetch is cached as well,
//! so the whole scan sees the same answer for that date. The pipeline clears
//! the cache when a run starts, so a rerun fetches a fresh list.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::Factor;
use crate::data::{MarketDataProvider, ProviderError};

type ListedCodes = Result<Arc<HashSet<String>>, ProviderError>;

#[derive(Debug, Default)]
pub struct LargeTradeChecker {
    cache: Mutex<HashMap<NaiveDate, ListedCodes>>,
}

impl LargeTradeChecker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached list.
    pub async fn clear(&self) {
        self.cache.lock().await.clear();
    }

    /// Whether `ts_code` appears on the list for `date`.
    pub async fn evaluate(
        &self,
        provider: &dyn MarketDataProvider,
        ts_code: &str,
        date: NaiveDate,
    ) -> Factor<bool> {
        match self.listed(provider, date).await {
            Ok(codes) => Factor::Value(codes.contains(ts_code)),
            Err(e) => Factor::Failed(e),
        }
    }

    /// The set of listed codes for `date`, fetching it on first use.
    pub async fn listed(
        &self,
        provider: &dyn MarketDataProvider,
        date: NaiveDate,
    ) -> ListedCodes {
        // Held across the fetch so concurrent callers wait for the first one.
        let mut cache = self.cache.lock().await;
        if let Some(entry) = cache.get(&date) {
            return entry.clone();
        }

        let entry = match provider.large_trade_list(date).await {
            Ok(entries) => {
                let codes: HashSet<String> = entries.into_iter().map(|e| e.ts_code).collect();
                info!(%date, listed = codes.len(), "Loaded large-trade list");
                Ok(Arc::new(codes))
            }
            Err(e) => {
                warn!(%date, error = %e, "Large-trade list unavailable, treating every security as unlisted");
                Err(e)
            }
        };

        cache.insert(date, entry.clone());
        entry
    }

    pub fn check(&self, listed: bool) -> Result<(), String> {
        if listed {
            Ok(())
        } else {
            Err("not on the large-trade list".to_string())
        }
    }
}
