//! Gate stages and the screening funnel.

use serde::{Deserialize, Serialize};

use crate::data::ProviderError;

// ============================================================================
// Gate Stage
// ============================================================================

/// The six gates, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateStage {
    /// Golden cross, RSI, turnover
    Technical,
    /// PE and ROE of the year-end disclosure
    Fundamental,
    /// Net main-capital inflow
    MoneyFlow,
    /// Large-trade disclosure list membership
    LargeTrade,
    /// Announcement sentiment
    Sentiment,
    /// Hot-industry membership
    Sector,
}

impl GateStage {
    pub const ALL: [GateStage; 6] = [
        Self::Technical,
        Self::Fundamental,
        Self::MoneyFlow,
        Self::LargeTrade,
        Self::Sentiment,
        Self::Sector,
    ];
}

impl std::fmt::Display for GateStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Technical => write!(f, "技术面"),
            Self::Fundamental => write!(f, "基本面"),
            Self::MoneyFlow => write!(f, "资金流向"),
            Self::LargeTrade => write!(f, "龙虎榜"),
            Self::Sentiment => write!(f, "公告情绪"),
            Self::Sector => write!(f, "热门行业"),
        }
    }
}

// ============================================================================
// Rejection
// ============================================================================

/// Why a gate rejected a security.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// The factor was computed and missed its threshold
    Threshold(String),
    /// Not enough data to compute the factor
    Undefined,
    /// The provider call behind the factor failed
    Failed(ProviderError),
    /// Evaluation panicked; carries the panic message
    Aborted(String),
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threshold(msg) => write!(f, "{}", msg),
            Self::Undefined => write!(f, "insufficient data"),
            Self::Failed(e) => write!(f, "fetch failed: {}", e),
            Self::Aborted(msg) => write!(f, "evaluation aborted: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub ts_code: String,
    pub stage: GateStage,
    pub reason: RejectReason,
}

// ============================================================================
// Stage Stats
// ============================================================================

/// Counts for one gate of the funnel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageStats {
    pub stage: GateStage,
    /// Securities that reached this gate
    pub input: usize,
    pub passed: usize,
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl StageStats {
    pub fn new(stage: GateStage, input: usize, passed: usize) -> Self {
        let eliminated = input.saturating_sub(passed);
        let elimination_rate = if input > 0 {
            (eliminated as f64 / input as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            input,
            passed,
            eliminated,
            elimination_rate,
        }
    }
}

/// Build the funnel from the number of scanned securities and the stage at
/// which each rejected one stopped.
pub fn tally<'a>(scanned: usize, rejected_at: impl IntoIterator<Item = &'a GateStage>) -> Vec<StageStats> {
    let mut eliminated = [0usize; 6];
    for stage in rejected_at {
        if let Some(i) = GateStage::ALL.iter().position(|s| s == stage) {
            eliminated[i] += 1;
        }
    }

    let mut input = scanned;
    GateStage::ALL
        .iter()
        .zip(eliminated)
        .map(|(&stage, out)| {
            let passed = input.saturating_sub(out);
            let stats = StageStats::new(stage, input, passed);
            input = passed;
            stats
        })
        .collect()
}
