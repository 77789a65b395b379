//! Persistence of the daily selection.
//!
//! A [`SelectionStore`] upserts one [`SelectionRecord`] per selected security,
//! keyed by `(trade_date, ts_code)`, so rerunning a date overwrites scores
//! instead of duplicating rows.
//!
//! # Backends
//! - **SQLite** (`SqliteSelectionStore`): local file, the default
//! - **Supabase** (`SupabaseSelectionStore`): PostgREST upsert into a hosted table

mod sqlite;
mod supabase;

pub use sqlite::SqliteSelectionStore;
pub use supabase::SupabaseSelectionStore;

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use picker_common::Config;

/// The persisted unit of a selection run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub trade_date: NaiveDate,
    pub ts_code: String,
    pub score: f64,
}

// ============================================================================
// Store Error
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    /// The backend answered with a non-success status
    #[error("Rejected by backend ({status}): {body}")]
    Rejected { status: u16, body: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

// ============================================================================
// Selection Store Trait
// ============================================================================

#[async_trait]
pub trait SelectionStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Insert the record, or overwrite the score of an existing
    /// `(trade_date, ts_code)` row.
    async fn upsert(&self, record: &SelectionRecord) -> Result<(), StoreError>;

    /// All records stored for `trade_date`, highest score first.
    async fn load(&self, trade_date: NaiveDate) -> Result<Vec<SelectionRecord>, StoreError>;
}

/// Open the backend named by `storage.backend`.
pub fn open_store(config: &Config) -> anyhow::Result<Arc<dyn SelectionStore>> {
    match config.storage.backend.to_ascii_lowercase().as_str() {
        "sqlite" => {
            let path = config.storage.resolved_db_path();
            let store = SqliteSelectionStore::open(&path, &config.storage.table)
                .with_context(|| format!("Failed to open selection store at {}", path.display()))?;
            Ok(Arc::new(store))
        }
        "supabase" => {
            let store = SupabaseSelectionStore::from_config(config)?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("Unknown storage backend: {}", other),
    }
}

// ============================================================================
// Batch Persistence
// ============================================================================

/// A record that could not be stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistFailure {
    pub ts_code: String,
    pub error: String,
}

/// Outcome of persisting a batch; there is no rollback across records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistReport {
    /// Records stored successfully
    pub stored: usize,
    pub failures: Vec<PersistFailure>,
}

impl PersistReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn attempted(&self) -> usize {
        self.stored + self.failures.len()
    }
}

/// Upsert every record in order; a failure never stops the remaining ones.
pub async fn persist_all(store: &dyn SelectionStore, records: &[SelectionRecord]) -> PersistReport {
    let mut report = PersistReport::default();

    for record in records {
        match store.upsert(record).await {
            Ok(()) => report.stored += 1,
            Err(e) => {
                warn!(
                    store = store.name(),
                    ts_code = %record.ts_code,
                    trade_date = %record.trade_date,
                    error = %e,
                    "Failed to persist selection record"
                );
                report.failures.push(PersistFailure {
                    ts_code: record.ts_code.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        store = store.name(),
        stored = report.stored,
        failed = report.failures.len(),
        "Persisted selection"
    );
    report
}
