//! Technical factors: moving-average crossover, RSI and turnover.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use picker_common::ScreenerConfig;

use super::Factor;
use crate::data::{MarketDataProvider, PriceBar};

/// Technical factors derived from the trailing price window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalFactors {
    /// Short moving average above the long one on the latest bar
    pub golden_cross: bool,
    pub ma_short: f64,
    pub ma_long: f64,
    /// Relative strength index (0-100)
    pub rsi: f64,
    /// Turnover rate (%) of the latest bar, when reported
    pub turnover_rate: Option<f64>,
}

/// Computes [`TechnicalFactors`] and applies the technical gate.
#[derive(Debug, Clone)]
pub struct TechnicalEvaluator {
    window_days: i64,
    min_bars: usize,
    short_ma: usize,
    long_ma: usize,
    rsi_period: usize,
    max_rsi: f64,
    min_turnover: f64,
}

impl Default for TechnicalEvaluator {
    fn default() -> Self {
        Self::from_config(&ScreenerConfig::default())
    }
}

impl TechnicalEvaluator {
    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self {
            window_days: config.technical_window_days,
            min_bars: config.min_bars,
            short_ma: config.short_ma,
            long_ma: config.long_ma,
            rsi_period: config.rsi_period,
            max_rsi: config.max_rsi,
            min_turnover: config.min_turnover,
        }
    }

    /// Fetch the trailing window ending at `date` and compute the factors.
    pub async fn evaluate(
        &self,
        provider: &dyn MarketDataProvider,
        ts_code: &str,
        date: NaiveDate,
    ) -> Factor<TechnicalFactors> {
        let start = date - Duration::days(self.window_days);

        let mut bars = match provider.daily_bars(ts_code, start, date).await {
            Ok(bars) => bars,
            Err(e) => return Factor::Failed(e),
        };
        bars.sort_by_key(|b| b.trade_date);

        match self.compute(&bars) {
            Some(factors) => Factor::Value(factors),
            None => {
                debug!(ts_code, bars = bars.len(), "Not enough bars for technical factors");
                Factor::Undefined
            }
        }
    }

    /// Compute factors from bars sorted ascending by date.
    ///
    /// Returns `None` when fewer than `min_bars` bars are available.
    pub fn compute(&self, bars: &[PriceBar]) -> Option<TechnicalFactors> {
        if bars.len() < self.min_bars {
            return None;
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let ma_short = sma(&closes, self.short_ma)?;
        let ma_long = sma(&closes, self.long_ma)?;
        let rsi = wilder_rsi(&closes, self.rsi_period)?;

        Some(TechnicalFactors {
            golden_cross: ma_short > ma_long,
            ma_short,
            ma_long,
            rsi,
            turnover_rate: bars.last().and_then(|b| b.turnover_rate),
        })
    }

    /// Gate check; `Err` carries the rejection reason.
    pub fn check(&self, factors: &TechnicalFactors) -> Result<(), String> {
        if !factors.golden_cross {
            return Err(format!(
                "no golden cross (MA{} {:.2} <= MA{} {:.2})",
                self.short_ma, factors.ma_short, self.long_ma, factors.ma_long
            ));
        }
        if factors.rsi > self.max_rsi {
            return Err(format!("RSI {:.1} above {:.0}", factors.rsi, self.max_rsi));
        }
        if let Some(turnover) = factors.turnover_rate {
            if turnover < self.min_turnover {
                return Err(format!(
                    "turnover {:.2}% below {:.2}%",
                    turnover, self.min_turnover
                ));
            }
        }
        Ok(())
    }
}

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Wilder-smoothed relative strength index over `period` deltas.
///
/// Needs at least `period + 1` closes. With zero average loss the index
/// saturates at 100, or sits at 50 when there was no movement at all.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let n = period as f64;

    let (seed_gain, seed_loss) = deltas[..period]
        .iter()
        .fold((0.0, 0.0), |(g, l), &d| (g + d.max(0.0), l + (-d).max(0.0)));
    let mut avg_gain = seed_gain / n;
    let mut avg_loss = seed_loss / n;

    for &d in &deltas[period..] {
        avg_gain = (avg_gain * (n - 1.0) + d.max(0.0)) / n;
        avg_loss = (avg_loss * (n - 1.0) + (-d).max(0.0)) / n;
    }

    let rsi = if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };

    rsi.is_finite().then(|| rsi.clamp(0.0, 100.0))
}
