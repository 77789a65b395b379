//! The selection pipeline.
//!
//! Every security of the universe runs through six gates in a fixed order:
//!
//! ```text
//! technical → fundamental → money flow → large trade → sentiment → sector → scored
//! ```
//!
//! The first failing gate rejects the security and no further provider calls
//! are made for it. Securities are evaluated concurrently, but results are
//! collected in universe order and ranking only starts once every security
//! has a verdict, so the stable sort breaks score ties by listing order.
//!
//! A panic while evaluating one security rejects that security with
//! [`RejectReason::Aborted`] at the gate it had reached; the scan goes on.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use picker_common::logging::generate_run_id;
use picker_common::{ScoreWeights, ScreenerConfig};

use super::funnel::{tally, GateStage, RejectReason, Rejection};
use super::report::{Candidate, SelectionOutcome};
use crate::data::{MarketDataProvider, ProviderError, Security};
use crate::factors::{
    Factor, FundamentalEvaluator, LargeTradeChecker, LexiconScorer, MoneyFlowEvaluator,
    SectorClassifier, SentimentEvaluator, SentimentScorer, TechnicalEvaluator,
};
use crate::storage::{persist_all, SelectionRecord, SelectionStore};

/// Terminal state of one security.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Scored(Candidate),
    Rejected(Rejection),
}

pub struct SelectionPipeline {
    provider: Arc<dyn MarketDataProvider>,
    store: Arc<dyn SelectionStore>,
    config: ScreenerConfig,
    technical: TechnicalEvaluator,
    fundamental: FundamentalEvaluator,
    money_flow: MoneyFlowEvaluator,
    large_trade: LargeTradeChecker,
    sentiment: SentimentEvaluator,
    sector: SectorClassifier,
}

impl SelectionPipeline {
    /// Create a pipeline scoring announcements with the built-in lexicon.
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn SelectionStore>,
        config: ScreenerConfig,
    ) -> Result<Self> {
        let scorer = LexiconScorer::financial().context("Failed to build sentiment lexicon")?;
        Ok(Self::with_scorer(provider, store, config, Arc::new(scorer)))
    }

    /// Create a pipeline with a custom sentiment scorer.
    pub fn with_scorer(
        provider: Arc<dyn MarketDataProvider>,
        store: Arc<dyn SelectionStore>,
        config: ScreenerConfig,
        scorer: Arc<dyn SentimentScorer>,
    ) -> Self {
        Self {
            technical: TechnicalEvaluator::from_config(&config),
            fundamental: FundamentalEvaluator::from_config(&config),
            money_flow: MoneyFlowEvaluator::from_config(&config),
            large_trade: LargeTradeChecker::new(),
            sentiment: SentimentEvaluator::new(scorer, &config),
            sector: SectorClassifier::from_config(&config),
            provider,
            store,
            config,
        }
    }

    /// Scan the universe for `trade_date`, persist the top candidates and
    /// return the run outcome.
    ///
    /// Only a failure to list the universe fails the run; per-security
    /// problems end as rejections and persistence problems are reported in
    /// [`SelectionOutcome::persist`].
    pub async fn run(&self, trade_date: NaiveDate) -> Result<SelectionOutcome> {
        let started_at = Utc::now();
        let run_id = generate_run_id();

        self.large_trade.clear().await;

        let universe = self
            .provider
            .list_securities()
            .await
            .with_context(|| format!("Failed to list securities from {}", self.provider.name()))?;

        info!(
            run_id = %run_id,
            %trade_date,
            provider = self.provider.name(),
            universe = universe.len(),
            concurrency = self.config.concurrency,
            "Starting selection run"
        );

        let verdicts: Vec<Verdict> = stream::iter(universe.iter().cloned())
            .map(|security| async move { self.evaluate_security(&security, trade_date).await })
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut candidates = Vec::new();
        let mut rejected_at = Vec::new();
        for verdict in verdicts {
            match verdict {
                Verdict::Scored(candidate) => candidates.push(candidate),
                Verdict::Rejected(rejection) => rejected_at.push(rejection.stage),
            }
        }

        let funnel = tally(universe.len(), &rejected_at);
        let scored = candidates.len();
        let selected = rank(candidates, self.config.top_k);

        let records: Vec<SelectionRecord> = selected.iter().map(|c| c.to_record(trade_date)).collect();
        let persist = persist_all(self.store.as_ref(), &records).await;

        let completed_at = Utc::now();
        let outcome = SelectionOutcome {
            run_id,
            trade_date,
            scanned: universe.len(),
            scored,
            funnel,
            selected,
            persist,
            started_at,
            completed_at,
            duration_secs: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
        };

        info!(run_id = %outcome.run_id, "{}", outcome.summary());
        Ok(outcome)
    }

    /// Run one security through the gates.
    pub async fn evaluate_security(&self, security: &Security, date: NaiveDate) -> Verdict {
        let cursor = StageCursor::default();
        let result = match AssertUnwindSafe(self.gate_chain(security, date, &cursor))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => {
                let stage = cursor.current();
                let message = panic_message(payload.as_ref());
                error!(ts_code = %security.ts_code, %stage, panic = %message, "Evaluation panicked");
                Err((stage, RejectReason::Aborted(message)))
            }
        };

        match result {
            Ok(candidate) => {
                debug!(ts_code = %candidate.ts_code, score = candidate.score, "Security scored");
                Verdict::Scored(candidate)
            }
            Err((stage, reason)) => {
                match &reason {
                    RejectReason::Failed(e) => {
                        warn!(ts_code = %security.ts_code, %stage, error = %e, "Rejected after provider failure")
                    }
                    _ => debug!(ts_code = %security.ts_code, %stage, %reason, "Rejected"),
                }
                Verdict::Rejected(Rejection {
                    ts_code: security.ts_code.clone(),
                    stage,
                    reason,
                })
            }
        }
    }

    async fn gate_chain(
        &self,
        security: &Security,
        date: NaiveDate,
        cursor: &StageCursor,
    ) -> std::result::Result<Candidate, (GateStage, RejectReason)> {
        let provider = self.provider.as_ref();
        let code = security.ts_code.as_str();

        cursor.enter(GateStage::Technical);
        let technical = required(
            GateStage::Technical,
            self.technical.evaluate(provider, code, date).await,
        )?;
        threshold(GateStage::Technical, self.technical.check(&technical), None)?;

        cursor.enter(GateStage::Fundamental);
        let fundamental = required(
            GateStage::Fundamental,
            self.fundamental.evaluate(provider, code, date).await,
        )?;
        threshold(GateStage::Fundamental, self.fundamental.check(&fundamental), None)?;

        cursor.enter(GateStage::MoneyFlow);
        let (net_inflow, error) = with_default(self.money_flow.evaluate(provider, code, date).await, 0.0);
        threshold(GateStage::MoneyFlow, self.money_flow.check(net_inflow), error)?;

        cursor.enter(GateStage::LargeTrade);
        let (listed, error) = with_default(self.large_trade.evaluate(provider, code, date).await, false);
        threshold(GateStage::LargeTrade, self.large_trade.check(listed), error)?;

        cursor.enter(GateStage::Sentiment);
        let (sentiment, error) = with_default(self.sentiment.evaluate(provider, code, date).await, 0.0);
        threshold(GateStage::Sentiment, self.sentiment.check(sentiment), error)?;

        cursor.enter(GateStage::Sector);
        let (industry, error) = with_default(self.sector.evaluate(provider, security).await, String::new());
        threshold(GateStage::Sector, self.sector.check(&industry), error)?;

        let score = composite_score(
            &self.config.weights,
            technical.golden_cross,
            fundamental.roe,
            net_inflow,
            sentiment,
        );

        Ok(Candidate {
            ts_code: security.ts_code.clone(),
            name: security.name.clone(),
            industry,
            score,
            technical,
            fundamental,
            net_inflow,
            sentiment,
        })
    }
}

/// The gate a security's evaluation has reached.
#[derive(Debug, Default)]
struct StageCursor(AtomicUsize);

impl StageCursor {
    fn enter(&self, stage: GateStage) {
        if let Some(i) = GateStage::ALL.iter().position(|s| *s == stage) {
            self.0.store(i, Ordering::Relaxed);
        }
    }

    fn current(&self) -> GateStage {
        let i = self.0.load(Ordering::Relaxed);
        GateStage::ALL[i.min(GateStage::ALL.len() - 1)]
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// A factor the gate cannot judge without.
fn required<T>(stage: GateStage, factor: Factor<T>) -> std::result::Result<T, (GateStage, RejectReason)> {
    match factor {
        Factor::Value(v) => Ok(v),
        Factor::Undefined => Err((stage, RejectReason::Undefined)),
        Factor::Failed(e) => Err((stage, RejectReason::Failed(e))),
    }
}

/// A factor that falls back to `default`; the fetch error is kept for the
/// rejection reason.
fn with_default<T>(factor: Factor<T>, default: T) -> (T, Option<ProviderError>) {
    match factor {
        Factor::Value(v) => (v, None),
        Factor::Undefined => (default, None),
        Factor::Failed(e) => (default, Some(e)),
    }
}

fn threshold(
    stage: GateStage,
    check: std::result::Result<(), String>,
    error: Option<ProviderError>,
) -> std::result::Result<(), (GateStage, RejectReason)> {
    check.map_err(|msg| {
        let reason = match error {
            Some(e) => RejectReason::Failed(e),
            None => RejectReason::Threshold(msg),
        };
        (stage, reason)
    })
}

/// Weighted sum of the factors of a security that passed every gate.
///
/// With the default weights:
/// `1.0 × golden_cross + 0.5 × ROE/20 + 0.5 × inflow/1e6 + 0.5 × sentiment`.
pub fn composite_score(
    weights: &ScoreWeights,
    golden_cross: bool,
    roe: f64,
    net_inflow: f64,
    sentiment: f64,
) -> f64 {
    let cross = if golden_cross { 1.0 } else { 0.0 };
    weights.golden_cross * cross
        + weights.roe * roe / weights.roe_scale
        + weights.inflow * net_inflow / weights.inflow_scale
        + weights.sentiment * sentiment
}

/// Sort by score descending, keeping input order for ties, and keep `top_k`.
pub fn rank(mut candidates: Vec<Candidate>, top_k: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates.truncate(top_k);
    candidates
}
