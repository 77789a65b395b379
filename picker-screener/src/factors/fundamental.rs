//! Fundamental factors from the year-end indicator disclosure.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use picker_common::ScreenerConfig;

use super::Factor;
use crate::data::MarketDataProvider;

/// Valuation and profitability ratios of the latest disclosure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalFactors {
    pub pe: f64,
    pub pb: Option<f64>,
    /// Return on equity (%)
    pub roe: f64,
}

/// The reporting period queried for `date`: December 31 of the same year.
///
/// Early in the year this period has usually not been disclosed yet, which
/// makes the factor undefined for those dates.
pub fn period_end_for(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date)
}

#[derive(Debug, Clone)]
pub struct FundamentalEvaluator {
    max_pe: f64,
    min_roe: f64,
}

impl Default for FundamentalEvaluator {
    fn default() -> Self {
        Self::from_config(&ScreenerConfig::default())
    }
}

impl FundamentalEvaluator {
    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self {
            max_pe: config.max_pe,
            min_roe: config.min_roe,
        }
    }

    /// Read PE, PB and ROE from the first record of the period's disclosures.
    pub async fn evaluate(
        &self,
        provider: &dyn MarketDataProvider,
        ts_code: &str,
        date: NaiveDate,
    ) -> Factor<FundamentalFactors> {
        let period = period_end_for(date);

        provider
            .fundamental_indicators(ts_code, period)
            .await
            .map(|records| {
                records.first().and_then(|r| {
                    Some(FundamentalFactors {
                        pe: r.pe?,
                        pb: r.pb,
                        roe: r.roe?,
                    })
                })
            })
            .into()
    }

    pub fn check(&self, factors: &FundamentalFactors) -> Result<(), String> {
        if factors.pe > self.max_pe {
            return Err(format!("PE {:.1} above {:.0}", factors.pe, self.max_pe));
        }
        if factors.roe < self.min_roe {
            return Err(format!("ROE {:.1}% below {:.0}%", factors.roe, self.min_roe));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_end_for() {
        let early = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let late = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(period_end_for(early), late);
        assert_eq!(period_end_for(late), late);
    }

    #[test]
    fn test_check_thresholds() {
        let evaluator = FundamentalEvaluator::default();
        let mut factors = FundamentalFactors {
            pe: 15.0,
            pb: Some(1.2),
            roe: 12.0,
        };
        assert!(evaluator.check(&factors).is_ok());

        factors.pe = 20.0;
        assert!(evaluator.check(&factors).is_ok());

        factors.pe = 25.0;
        assert!(evaluator.check(&factors).unwrap_err().starts_with("PE"));

        factors.pe = 10.0;
        factors.roe = 9.9;
        assert!(evaluator.check(&factors).unwrap_err().starts_with("ROE"));
    }
}
