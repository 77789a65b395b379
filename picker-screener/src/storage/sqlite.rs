//! SQLite selection store.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{SelectionRecord, SelectionStore, StoreError};

pub struct SqliteSelectionStore {
    /// `Connection` is Send but not Sync, hence the Mutex
    db: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteSelectionStore {
    /// Open (or create) the database and ensure the selection table exists.
    ///
    /// `table` must be a plain identifier; configuration validation enforces it.
    pub fn open(db_path: &Path, table: &str) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path).context("Failed to open selection database")?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                trade_date TEXT NOT NULL,
                ts_code TEXT NOT NULL,
                score REAL NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (trade_date, ts_code)
            );

            CREATE INDEX IF NOT EXISTS idx_{table}_date_score
            ON {table}(trade_date, score DESC);
            "#
        ))
        .context("Failed to create selection table")?;

        info!(db_path = %db_path.display(), table, "Initialized selection store");

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            table: table.to_string(),
        })
    }
}

#[async_trait]
impl SelectionStore for SqliteSelectionStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn upsert(&self, record: &SelectionRecord) -> Result<(), StoreError> {
        let db = self.db.lock().await;

        db.execute(
            &format!(
                r#"
                INSERT INTO {} (trade_date, ts_code, score, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(trade_date, ts_code) DO UPDATE SET
                    score = excluded.score,
                    updated_at = excluded.updated_at
                "#,
                self.table
            ),
            params![
                record.trade_date.to_string(),
                record.ts_code,
                record.score,
                Utc::now().to_rfc3339(),
            ],
        )?;

        debug!(ts_code = %record.ts_code, score = record.score, "Upserted selection record");
        Ok(())
    }

    async fn load(&self, trade_date: NaiveDate) -> Result<Vec<SelectionRecord>, StoreError> {
        let db = self.db.lock().await;

        let mut stmt = db.prepare(&format!(
            "SELECT ts_code, score FROM {} WHERE trade_date = ?1 ORDER BY score DESC, ts_code",
            self.table
        ))?;

        let records = stmt
            .query_map(params![trade_date.to_string()], |row| {
                Ok(SelectionRecord {
                    trade_date,
                    ts_code: row.get(0)?,
                    score: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }
}
