//! Industry classification against the configured hot-industry set.

use std::collections::HashSet;

use picker_common::ScreenerConfig;

use super::Factor;
use crate::data::{MarketDataProvider, Security};

#[derive(Debug, Clone)]
pub struct SectorClassifier {
    hot_industries: HashSet<String>,
}

impl Default for SectorClassifier {
    fn default() -> Self {
        Self::from_config(&ScreenerConfig::default())
    }
}

impl SectorClassifier {
    pub fn new<I, S>(hot_industries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hot_industries: hot_industries.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &ScreenerConfig) -> Self {
        Self::new(config.hot_industries.iter().cloned())
    }

    /// Industry label of `security`.
    ///
    /// Uses the label carried by the universe listing and only asks the
    /// provider when the listing has none.
    pub async fn evaluate(
        &self,
        provider: &dyn MarketDataProvider,
        security: &Security,
    ) -> Factor<String> {
        if let Some(industry) = security.industry.as_deref().filter(|s| !s.is_empty()) {
            return Factor::Value(industry.to_string());
        }

        provider
            .security_info(&security.ts_code)
            .await
            .map(|info| info.and_then(|s| s.industry).filter(|s| !s.is_empty()))
            .into()
    }

    pub fn is_hot(&self, industry: &str) -> bool {
        self.hot_industries.contains(industry)
    }

    pub fn check(&self, industry: &str) -> Result<(), String> {
        if self.is_hot(industry) {
            Ok(())
        } else if industry.is_empty() {
            Err("no industry label".to_string())
        } else {
            Err(format!("industry {} not in hot list", industry))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_hot_industries() {
        let classifier = SectorClassifier::default();
        assert!(classifier.is_hot("半导体"));
        assert!(classifier.is_hot("计算机"));
        assert!(!classifier.is_hot("银行"));
        assert!(classifier.check("").is_err());
    }

    #[test]
    fn test_injected_set() {
        let classifier = SectorClassifier::new(["银行"]);
        assert!(classifier.check("银行").is_ok());
        assert!(classifier.check("半导体").unwrap_err().contains("半导体"));
    }
}
