//! Supabase selection store over the PostgREST API.
//!
//! Upserts use `on_conflict=trade_date,ts_code` together with
//! `Prefer: resolution=merge-duplicates`, so the table needs a unique
//! constraint on that pair.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::debug;

use picker_common::Config;

use super::{SelectionRecord, SelectionStore, StoreError};

pub struct SupabaseSelectionStore {
    client: reqwest::Client,
    /// Project URL, without trailing slash
    base_url: String,
    api_key: String,
    table: String,
}

impl SupabaseSelectionStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, table: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            table: table.into(),
        }
    }

    pub fn from_config(config: &Config) -> picker_common::Result<Self> {
        let url = config.supabase_url()?;
        let key = config.supabase_key()?;

        Ok(Self::new(url, key, config.storage.table.clone()))
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl SelectionStore for SupabaseSelectionStore {
    fn name(&self) -> &'static str {
        "supabase"
    }

    async fn upsert(&self, record: &SelectionRecord) -> Result<(), StoreError> {
        let request = self
            .client
            .post(self.table_url())
            .query(&[("on_conflict", "trade_date,ts_code")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[record]);

        let response = self.authorized(request).send().await?;
        Self::check_status(response).await?;

        debug!(ts_code = %record.ts_code, score = record.score, "Upserted selection record");
        Ok(())
    }

    async fn load(&self, trade_date: NaiveDate) -> Result<Vec<SelectionRecord>, StoreError> {
        let date_filter = format!("eq.{}", trade_date);
        let request = self.client.get(self.table_url()).query(&[
            ("select", "trade_date,ts_code,score"),
            ("trade_date", date_filter.as_str()),
            ("order", "score.desc"),
        ]);

        let response = self.authorized(request).send().await?;
        let response = Self::check_status(response).await?;

        Ok(response.json().await?)
    }
}
