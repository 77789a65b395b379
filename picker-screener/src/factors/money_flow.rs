//! Net main-capital inflow for the evaluation date.

use chrono::NaiveDate;

use picker_common::ScreenerConfig;

use super::Factor;
use crate::data::MarketDataProvider;

#[derive(Debug, Clone)]
pub struct MoneyFlowEvaluator {
    min_net_inflow: f64,
}

impl Default for MoneyFlowEvaluator {
    fn default() -> Self {
        Self::from_config(&ScreenerConfig::default())
    }
}

impl MoneyFlowEvaluator {
    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self {
            min_net_inflow: config.min_net_inflow,
        }
    }

    /// Sum of `net_mf_amount` over the date's rows.
    ///
    /// An empty result is a valid zero inflow, not `Undefined`.
    pub async fn evaluate(
        &self,
        provider: &dyn MarketDataProvider,
        ts_code: &str,
        date: NaiveDate,
    ) -> Factor<f64> {
        match provider.money_flow(ts_code, date).await {
            Ok(rows) => Factor::Value(rows.iter().map(|r| r.net_mf_amount).sum()),
            Err(e) => Factor::Failed(e),
        }
    }

    /// Inflow must be strictly above the threshold.
    pub fn check(&self, net_inflow: f64) -> Result<(), String> {
        if net_inflow > self.min_net_inflow {
            Ok(())
        } else {
            Err(format!("net inflow {:.0} not above {:.0}", net_inflow, self.min_net_inflow))
        }
    }
}
