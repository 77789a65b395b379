//! Result of one selection run.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::funnel::StageStats;
use crate::factors::{FundamentalFactors, TechnicalFactors};
use crate::storage::{PersistReport, SelectionRecord};

/// A security that passed every gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub ts_code: String,
    pub name: String,
    pub industry: String,
    /// Composite score
    pub score: f64,
    pub technical: TechnicalFactors,
    pub fundamental: FundamentalFactors,
    pub net_inflow: f64,
    pub sentiment: f64,
}

impl Candidate {
    pub fn to_record(&self, trade_date: NaiveDate) -> SelectionRecord {
        SelectionRecord {
            trade_date,
            ts_code: self.ts_code.clone(),
            score: self.score,
        }
    }
}

/// Everything a selection run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionOutcome {
    /// Run identifier (UUID v4)
    pub run_id: String,
    pub trade_date: NaiveDate,
    /// Securities in the universe
    pub scanned: usize,
    /// Securities that passed every gate
    pub scored: usize,
    /// Per-gate funnel
    pub funnel: Vec<StageStats>,
    /// Top candidates, highest score first
    pub selected: Vec<Candidate>,
    pub persist: PersistReport,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// Duration in seconds
    pub duration_secs: f64,
}

impl SelectionOutcome {
    /// Summary string for logging.
    pub fn summary(&self) -> String {
        format!(
            "Scanned {} securities for {} in {:.1}s: {} scored, {} selected, {}/{} persisted",
            self.scanned,
            self.trade_date,
            self.duration_secs,
            self.scored,
            self.selected.len(),
            self.persist.stored,
            self.persist.attempted(),
        )
    }

    /// Plain-text report for stdout.
    pub fn render_table(&self) -> String {
        let mut out = String::new();

        out.push_str(&format!("选股结果 {} (run {})\n\n", self.trade_date, self.run_id));

        out.push_str("阶段        输入   通过   淘汰   淘汰率\n");
        for stats in &self.funnel {
            out.push_str(&format!(
                "{:<8}  {:>6} {:>6} {:>6} {:>7.1}%\n",
                stats.stage.to_string(),
                stats.input,
                stats.passed,
                stats.eliminated,
                stats.elimination_rate
            ));
        }
        out.push('\n');

        if self.selected.is_empty() {
            out.push_str("无入选股票\n");
            return out;
        }

        out.push_str("排名  代码        名称        行业      得分    ROE    净流入      情绪   RSI\n");
        for (rank, c) in self.selected.iter().enumerate() {
            out.push_str(&format!(
                "{:<4}  {:<10}  {:<8}  {:<6}  {:>6.3}  {:>5.1}%  {:>10.0}  {:>5.2}  {:>5.1}\n",
                rank + 1,
                c.ts_code,
                c.name,
                c.industry,
                c.score,
                c.fundamental.roe,
                c.net_inflow,
                c.sentiment,
                c.technical.rsi,
            ));
        }

        if !self.persist.is_complete() {
            out.push('\n');
            for failure in &self.persist.failures {
                out.push_str(&format!("保存失败 {}: {}\n", failure.ts_code, failure.error));
            }
        }

        out
    }
}
