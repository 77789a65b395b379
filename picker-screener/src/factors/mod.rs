//! Per-security factor evaluators.
//!
//! Each evaluator reads through a [`MarketDataProvider`](crate::data::MarketDataProvider),
//! derives one factor group and exposes a gate check. Evaluators never panic
//! and never return `Err`: a fetch failure is reported as [`Factor::Failed`] so
//! callers can tell "no data" apart from "the provider broke".
//!
//! | Evaluator | Undefined when | Failed maps to |
//! |-----------|----------------|----------------|
//! | Technical | fewer than `min_bars` bars | reject |
//! | Fundamental | no disclosure, or PE/ROE missing | reject |
//! | Money flow | never (no rows ⇒ 0) | net inflow 0 |
//! | Large trade | never | not listed |
//! | Sentiment | never (no text ⇒ 0) | sentiment 0 |
//! | Sector | no industry label | empty label |

mod fundamental;
mod large_trade;
mod money_flow;
mod sector;
mod sentiment;
mod technical;

pub use fundamental::{period_end_for, FundamentalEvaluator, FundamentalFactors};
pub use large_trade::LargeTradeChecker;
pub use money_flow::MoneyFlowEvaluator;
pub use sector::SectorClassifier;
pub use sentiment::{LexiconScorer, SentimentEvaluator, SentimentScorer};
pub use technical::{sma, wilder_rsi, TechnicalEvaluator, TechnicalFactors};

use crate::data::ProviderError;

/// Outcome of one factor evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Factor<T> {
    /// The factor was computed
    Value(T),
    /// The provider answered but the data is insufficient
    Undefined,
    /// The provider call failed
    Failed(ProviderError),
}

impl<T> From<Result<Option<T>, ProviderError>> for Factor<T> {
    fn from(result: Result<Option<T>, ProviderError>) -> Self {
        match result {
            Ok(Some(v)) => Self::Value(v),
            Ok(None) => Self::Undefined,
            Err(e) => Self::Failed(e),
        }
    }
}
