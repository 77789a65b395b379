//! Announcement sentiment.
//!
//! The evaluator scores every same-day announcement that has body text and
//! keeps the maximum. Scoring itself sits behind [`SentimentScorer`] so a
//! model-backed scorer can replace the default lexicon.

use std::sync::Arc;

use aho_corasick::{AhoCorasick, BuildError, MatchKind};
use chrono::NaiveDate;

use picker_common::ScreenerConfig;

use super::Factor;
use crate::data::MarketDataProvider;

/// Maps text to a sentiment in `[0, 1]`; higher is more positive.
pub trait SentimentScorer: Send + Sync {
    fn score(&self, text: &str) -> f64;
}

// ============================================================================
// Lexicon Scorer
// ============================================================================

/// Positive announcement vocabulary with weights.
const POSITIVE_TERMS: &[(&str, f64)] = &[
    ("增长", 1.0),
    ("大幅增长", 1.5),
    ("预增", 1.5),
    ("扭亏", 1.5),
    ("扭亏为盈", 2.0),
    ("盈利", 1.0),
    ("超预期", 1.5),
    ("创新高", 1.5),
    ("中标", 1.5),
    ("战略合作", 1.2),
    ("获批", 1.2),
    ("回购", 1.0),
    ("增持", 1.5),
    ("分红", 1.0),
    ("派息", 1.0),
    ("高送转", 1.5),
    ("突破", 1.0),
    ("提升", 0.8),
    ("利好", 1.5),
];

/// Negative announcement vocabulary with weights.
const NEGATIVE_TERMS: &[(&str, f64)] = &[
    ("下降", 1.0),
    ("大幅下降", 1.5),
    ("下滑", 1.0),
    ("预减", 1.5),
    ("预亏", 1.5),
    ("亏损", 1.5),
    ("减持", 1.5),
    ("违规", 1.5),
    ("处罚", 1.5),
    ("立案", 2.0),
    ("调查", 1.0),
    ("诉讼", 1.2),
    ("风险", 0.8),
    ("退市", 2.0),
    ("质押", 0.8),
    ("冻结", 1.2),
    ("终止", 1.0),
    ("延期", 0.6),
    ("问询", 0.8),
    ("警示", 1.2),
];

/// Single-character prefixes that flip the polarity of the following term.
const NEGATIONS: &[char] = &['不', '未', '无', '非'];

/// Weighted keyword scorer for Chinese financial announcements.
///
/// Terms are matched leftmost-longest, so "扭亏为盈" wins over "扭亏". With
/// positive weight `P` and negative weight `N` the score is
/// `(P + 1) / (P + N + 2)`, which is 0.5 for text with no hits.
pub struct LexiconScorer {
    matcher: AhoCorasick,
    /// Signed weight per pattern id
    weights: Vec<f64>,
}

impl std::fmt::Debug for LexiconScorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LexiconScorer")
            .field("terms", &self.weights.len())
            .finish()
    }
}

impl LexiconScorer {
    /// Build from explicit term lists; weights are magnitudes.
    pub fn new(positive: &[(&str, f64)], negative: &[(&str, f64)]) -> Result<Self, BuildError> {
        let terms: Vec<(&str, f64)> = positive
            .iter()
            .map(|&(t, w)| (t, w.abs()))
            .chain(negative.iter().map(|&(t, w)| (t, -w.abs())))
            .collect();

        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::LeftmostLongest)
            .build(terms.iter().map(|(t, _)| *t))?;

        Ok(Self {
            matcher,
            weights: terms.into_iter().map(|(_, w)| w).collect(),
        })
    }

    /// The built-in financial announcement lexicon.
    pub fn financial() -> Result<Self, BuildError> {
        Self::new(POSITIVE_TERMS, NEGATIVE_TERMS)
    }

    /// Positive and negative weight totals found in `text`.
    pub fn tally(&self, text: &str) -> (f64, f64) {
        let mut positive = 0.0;
        let mut negative = 0.0;

        for m in self.matcher.find_iter(text) {
            let mut weight = self.weights[m.pattern().as_usize()];
            let negated = text[..m.start()]
                .chars()
                .next_back()
                .is_some_and(|c| NEGATIONS.contains(&c));
            if negated {
                weight = -weight;
            }

            if weight > 0.0 {
                positive += weight;
            } else {
                negative -= weight;
            }
        }

        (positive, negative)
    }
}

impl SentimentScorer for LexiconScorer {
    fn score(&self, text: &str) -> f64 {
        let (positive, negative) = self.tally(text);
        (positive + 1.0) / (positive + negative + 2.0)
    }
}

// ============================================================================
// Sentiment Evaluator
// ============================================================================

pub struct SentimentEvaluator {
    scorer: Arc<dyn SentimentScorer>,
    min_sentiment: f64,
}

impl SentimentEvaluator {
    pub fn new(scorer: Arc<dyn SentimentScorer>, config: &ScreenerConfig) -> Self {
        Self {
            scorer,
            min_sentiment: config.min_sentiment,
        }
    }

    /// Maximum score over the date's announcements; 0 when none has text.
    pub async fn evaluate(
        &self,
        provider: &dyn MarketDataProvider,
        ts_code: &str,
        date: NaiveDate,
    ) -> Factor<f64> {
        match provider.announcements(ts_code, date).await {
            Ok(announcements) => Factor::Value(
                announcements
                    .iter()
                    .filter_map(|a| a.text())
                    .map(|text| self.scorer.score(text).clamp(0.0, 1.0))
                    .fold(0.0, f64::max),
            ),
            Err(e) => Factor::Failed(e),
        }
    }

    pub fn check(&self, sentiment: f64) -> Result<(), String> {
        if sentiment >= self.min_sentiment {
            Ok(())
        } else {
            Err(format!(
                "sentiment {:.2} below {:.2}",
                sentiment, self.min_sentiment
            ))
        }
    }
}
