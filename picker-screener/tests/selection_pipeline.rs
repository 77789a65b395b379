//! Integration tests for the selection pipeline.
//!
//! Runs the full gate chain against an in-memory provider and a SQLite store
//! in a temp directory.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use tempfile::{tempdir, TempDir};

use picker_common::ScreenerConfig;
use picker_screener::data::{
    Announcement, FundamentalRecord, LargeTradeEntry, MarketDataProvider, MoneyFlowRecord,
    PriceBar, ProviderError, Security,
};
use picker_screener::factors::SentimentScorer;
use picker_screener::selection::{GateStage, RejectReason, SelectionPipeline, Verdict};
use picker_screener::storage::{
    persist_all, SelectionRecord, SelectionStore, SqliteSelectionStore, StoreError,
};

fn trade_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
}

// ============================================================================
// Fixtures
// ============================================================================

/// Everything the mock provider knows about one security.
#[derive(Clone)]
struct Fixture {
    security: Security,
    bars: Vec<PriceBar>,
    fundamentals: Vec<FundamentalRecord>,
    flows: Vec<MoneyFlowRecord>,
    announcements: Vec<Announcement>,
    /// Industry returned by `security_info`
    info_industry: Option<String>,
}

/// 25 daily bars with an upward drift and alternating moves, so the short
/// average sits above the long one while RSI stays near 60.
fn healthy_bars() -> Vec<PriceBar> {
    let end = trade_date();
    (0..25)
        .map(|i| PriceBar {
            trade_date: end - Duration::days(24 - i as i64),
            close: 10.0 + 0.05 * i as f64 + if i % 2 == 0 { 0.3 } else { 0.0 },
            turnover_rate: Some(2.0),
        })
        .collect()
}

fn announcement(code: &str, content: Option<&str>) -> Announcement {
    Announcement {
        ts_code: code.to_string(),
        ann_date: trade_date(),
        title: Some("公告".into()),
        content: content.map(str::to_string),
    }
}

/// A security that passes every gate with the given factor values.
fn passing(code: &str, roe: f64, inflow: f64, sentiment: f64) -> Fixture {
    Fixture {
        security: Security::new(code, format!("股票{}", code), Some("半导体")),
        bars: healthy_bars(),
        fundamentals: vec![FundamentalRecord {
            ts_code: code.to_string(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31),
            pe: Some(15.0),
            pb: Some(1.8),
            roe: Some(roe),
        }],
        flows: vec![
            MoneyFlowRecord {
                ts_code: code.to_string(),
                trade_date: trade_date(),
                net_mf_amount: inflow * 0.75,
            },
            MoneyFlowRecord {
                ts_code: code.to_string(),
                trade_date: trade_date(),
                net_mf_amount: inflow * 0.25,
            },
        ],
        announcements: vec![
            announcement(code, None),
            announcement(code, Some("0.1")),
            announcement(code, Some(&sentiment.to_string())),
        ],
        info_industry: Some("半导体".into()),
    }
}

/// Scores an announcement by reading its text as a number.
struct LiteralScorer;

impl SentimentScorer for LiteralScorer {
    fn score(&self, text: &str) -> f64 {
        text.trim().parse().unwrap_or(0.0)
    }
}

/// Like `LiteralScorer`, but panics on text it cannot handle.
struct PanickingScorer;

impl SentimentScorer for PanickingScorer {
    fn score(&self, text: &str) -> f64 {
        if text.contains("乱码") {
            panic!("unsupported encoding in announcement");
        }
        LiteralScorer.score(text)
    }
}

// ============================================================================
// Mock Provider
// ============================================================================

#[derive(Default)]
struct MockProvider {
    fixtures: Vec<Fixture>,
    large_trade: Vec<String>,
    fail_universe: bool,
    fail_money_flow: HashSet<String>,
    fail_large_trade: bool,
    daily_calls: AtomicU32,
    fundamental_calls: AtomicU32,
    money_flow_calls: AtomicU32,
    large_trade_calls: AtomicU32,
    announcement_calls: AtomicU32,
    info_calls: AtomicU32,
    periods: Mutex<Vec<NaiveDate>>,
}

impl MockProvider {
    fn new(fixtures: Vec<Fixture>) -> Self {
        let large_trade = fixtures.iter().map(|f| f.security.ts_code.clone()).collect();
        Self {
            fixtures,
            large_trade,
            ..Default::default()
        }
    }

    fn fixture(&self, ts_code: &str) -> Option<&Fixture> {
        self.fixtures.iter().find(|f| f.security.ts_code == ts_code)
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn list_securities(&self) -> Result<Vec<Security>, ProviderError> {
        if self.fail_universe {
            return Err(ProviderError::Auth("token expired".into()));
        }
        Ok(self.fixtures.iter().map(|f| f.security.clone()).collect())
    }

    async fn security_info(&self, ts_code: &str) -> Result<Option<Security>, ProviderError> {
        self.info_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.fixture(ts_code).map(|f| Security {
            industry: f.info_industry.clone(),
            ..f.security.clone()
        }))
    }

    async fn daily_bars(
        &self,
        ts_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceBar>, ProviderError> {
        self.daily_calls.fetch_add(1, Ordering::Relaxed);
        let mut bars: Vec<PriceBar> = self
            .fixture(ts_code)
            .map(|f| f.bars.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|b| b.trade_date >= start && b.trade_date <= end)
            .collect();
        // Providers return newest first
        bars.reverse();
        Ok(bars)
    }

    async fn fundamental_indicators(
        &self,
        ts_code: &str,
        period: NaiveDate,
    ) -> Result<Vec<FundamentalRecord>, ProviderError> {
        self.fundamental_calls.fetch_add(1, Ordering::Relaxed);
        self.periods.lock().unwrap().push(period);
        Ok(self.fixture(ts_code).map(|f| f.fundamentals.clone()).unwrap_or_default())
    }

    async fn money_flow(
        &self,
        ts_code: &str,
        _date: NaiveDate,
    ) -> Result<Vec<MoneyFlowRecord>, ProviderError> {
        self.money_flow_calls.fetch_add(1, Ordering::Relaxed);
        if self.fail_money_flow.contains(ts_code) {
            return Err(ProviderError::Network("connection reset".into()));
        }
        Ok(self.fixture(ts_code).map(|f| f.flows.clone()).unwrap_or_default())
    }

    async fn large_trade_list(&self, date: NaiveDate) -> Result<Vec<LargeTradeEntry>, ProviderError> {
        self.large_trade_calls.fetch_add(1, Ordering::Relaxed);
        // Widen the window for concurrent callers racing on the cache
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        if self.fail_large_trade {
            return Err(ProviderError::Unavailable("top_list down".into()));
        }
        Ok(self
            .large_trade
            .iter()
            .map(|code| LargeTradeEntry {
                ts_code: code.clone(),
                trade_date: date,
                name: None,
                reason: Some("日涨幅偏离值达7%".into()),
            })
            .collect())
    }

    async fn announcements(
        &self,
        ts_code: &str,
        _date: NaiveDate,
    ) -> Result<Vec<Announcement>, ProviderError> {
        self.announcement_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.fixture(ts_code).map(|f| f.announcements.clone()).unwrap_or_default())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn create_store() -> (TempDir, Arc<SqliteSelectionStore>) {
    let dir = tempdir().unwrap();
    let store = SqliteSelectionStore::open(&dir.path().join("picker.db"), "selected_stocks").unwrap();
    (dir, Arc::new(store))
}

fn pipeline(provider: Arc<MockProvider>, store: Arc<dyn SelectionStore>) -> SelectionPipeline {
    SelectionPipeline::with_scorer(provider, store, ScreenerConfig::default(), Arc::new(LiteralScorer))
}

fn rejection_stage(verdict: &Verdict) -> Option<GateStage> {
    match verdict {
        Verdict::Rejected(r) => Some(r.stage),
        Verdict::Scored(_) => None,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_end_to_end_only_full_pass_is_selected() {
    let a = passing("000001.SZ", 12.0, 200_000.0, 0.8);
    let b = passing("000002.SZ", 12.0, 200_000.0, 0.5);
    let mut c = passing("000003.SZ", 18.0, 500_000.0, 0.9);
    c.bars.truncate(10);

    let provider = Arc::new(MockProvider::new(vec![a, b, c]));
    let (_dir, store) = create_store();
    let outcome = pipeline(provider.clone(), store.clone()).run(trade_date()).await.unwrap();

    assert_eq!(outcome.scanned, 3);
    assert_eq!(outcome.scored, 1);
    assert_eq!(outcome.selected.len(), 1);
    assert_eq!(outcome.selected[0].ts_code, "000001.SZ");
    assert!((outcome.selected[0].score - 1.8).abs() < 1e-9);

    let stored = store.load(trade_date()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].ts_code, "000001.SZ");
    assert!((stored[0].score - 1.8).abs() < 1e-9);
    assert!(outcome.persist.is_complete());

    let technical = &outcome.funnel[0];
    assert_eq!((technical.input, technical.passed), (3, 2));
    let sentiment = outcome
        .funnel
        .iter()
        .find(|s| s.stage == GateStage::Sentiment)
        .unwrap();
    assert_eq!((sentiment.input, sentiment.passed), (2, 1));
}

#[tokio::test]
async fn test_fewer_than_twenty_bars_short_circuits() {
    let mut fixture = passing("000001.SZ", 15.0, 300_000.0, 0.9);
    fixture.bars = fixture.bars.split_off(6);
    assert_eq!(fixture.bars.len(), 19);

    let provider = Arc::new(MockProvider::new(vec![fixture.clone()]));
    let (_dir, store) = create_store();
    let verdict = pipeline(provider.clone(), store)
        .evaluate_security(&fixture.security, trade_date())
        .await;

    match verdict {
        Verdict::Rejected(r) => {
            assert_eq!(r.stage, GateStage::Technical);
            assert_eq!(r.reason, RejectReason::Undefined);
        }
        Verdict::Scored(_) => panic!("expected rejection"),
    }
    assert_eq!(provider.daily_calls.load(Ordering::Relaxed), 1);
    assert_eq!(provider.fundamental_calls.load(Ordering::Relaxed), 0);
    assert_eq!(provider.money_flow_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_empty_money_flow_rejects() {
    let mut fixture = passing("000001.SZ", 15.0, 300_000.0, 0.9);
    fixture.flows.clear();

    let provider = Arc::new(MockProvider::new(vec![fixture.clone()]));
    let (_dir, store) = create_store();
    let verdict = pipeline(provider.clone(), store)
        .evaluate_security(&fixture.security, trade_date())
        .await;

    assert_eq!(rejection_stage(&verdict), Some(GateStage::MoneyFlow));
    assert_eq!(provider.large_trade_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_money_flow_failure_rejects_without_aborting_scan() {
    let a = passing("000001.SZ", 15.0, 300_000.0, 0.9);
    let b = passing("000002.SZ", 15.0, 300_000.0, 0.9);

    let mut provider = MockProvider::new(vec![a, b]);
    provider.fail_money_flow.insert("000001.SZ".into());
    let provider = Arc::new(provider);
    let (_dir, store) = create_store();
    let pipeline = pipeline(provider.clone(), store);

    let failed = pipeline
        .evaluate_security(&provider.fixtures[0].security, trade_date())
        .await;
    match failed {
        Verdict::Rejected(r) => {
            assert_eq!(r.stage, GateStage::MoneyFlow);
            assert!(matches!(r.reason, RejectReason::Failed(ProviderError::Network(_))));
        }
        Verdict::Scored(_) => panic!("expected rejection"),
    }

    let outcome = pipeline.run(trade_date()).await.unwrap();
    assert_eq!(outcome.selected.len(), 1);
    assert_eq!(outcome.selected[0].ts_code, "000002.SZ");
}

#[tokio::test]
async fn test_fundamentals_use_year_end_period() {
    let fixture = passing("000001.SZ", 15.0, 300_000.0, 0.9);
    let provider = Arc::new(MockProvider::new(vec![fixture.clone()]));
    let (_dir, store) = create_store();

    pipeline(provider.clone(), store)
        .evaluate_security(&fixture.security, trade_date())
        .await;

    let periods = provider.periods.lock().unwrap().clone();
    assert_eq!(periods, vec![NaiveDate::from_ymd_opt(2024, 12, 31).unwrap()]);
}

#[tokio::test]
async fn test_missing_roe_rejects_as_undefined() {
    let mut fixture = passing("000001.SZ", 15.0, 300_000.0, 0.9);
    fixture.fundamentals[0].roe = None;

    let provider = Arc::new(MockProvider::new(vec![fixture.clone()]));
    let (_dir, store) = create_store();
    let verdict = pipeline(provider, store)
        .evaluate_security(&fixture.security, trade_date())
        .await;

    match verdict {
        Verdict::Rejected(r) => {
            assert_eq!(r.stage, GateStage::Fundamental);
            assert_eq!(r.reason, RejectReason::Undefined);
        }
        Verdict::Scored(_) => panic!("expected rejection"),
    }
}

#[tokio::test]
async fn test_top_five_of_eight_in_descending_order() {
    let roes = [12.0, 17.0, 10.0, 15.0, 11.0, 16.0, 13.0, 14.0];
    let fixtures: Vec<Fixture> = roes
        .iter()
        .enumerate()
        .map(|(i, &roe)| passing(&format!("60000{}.SH", i), roe, 200_000.0, 0.8))
        .collect();

    let provider = Arc::new(MockProvider::new(fixtures));
    let (_dir, store) = create_store();
    let outcome = pipeline(provider.clone(), store.clone()).run(trade_date()).await.unwrap();

    assert_eq!(outcome.scored, 8);
    let codes: Vec<&str> = outcome.selected.iter().map(|c| c.ts_code.as_str()).collect();
    assert_eq!(codes, vec!["600001.SH", "600005.SH", "600003.SH", "600007.SH", "600006.SH"]);
    assert!(outcome.selected.windows(2).all(|w| w[0].score > w[1].score));

    assert_eq!(store.load(trade_date()).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_large_trade_list_fetched_once_per_run() {
    let fixtures: Vec<Fixture> = (0..8)
        .map(|i| passing(&format!("00000{}.SZ", i), 12.0, 200_000.0, 0.9))
        .collect();

    let provider = Arc::new(MockProvider::new(fixtures));
    let (_dir, store) = create_store();
    let pipeline = pipeline(provider.clone(), store);

    pipeline.run(trade_date()).await.unwrap();
    assert_eq!(provider.large_trade_calls.load(Ordering::Relaxed), 1);

    // A rerun of the same date refetches instead of reusing a stale list
    pipeline.run(trade_date()).await.unwrap();
    assert_eq!(provider.large_trade_calls.load(Ordering::Relaxed), 2);
}

#[tokio::test]
async fn test_large_trade_failure_rejects_everyone_once() {
    let fixtures = vec![
        passing("000001.SZ", 12.0, 200_000.0, 0.9),
        passing("000002.SZ", 12.0, 200_000.0, 0.9),
    ];
    let mut provider = MockProvider::new(fixtures);
    provider.fail_large_trade = true;
    let provider = Arc::new(provider);
    let (_dir, store) = create_store();

    let outcome = pipeline(provider.clone(), store).run(trade_date()).await.unwrap();
    assert!(outcome.selected.is_empty());
    let stage = outcome
        .funnel
        .iter()
        .find(|s| s.stage == GateStage::LargeTrade)
        .unwrap();
    assert_eq!(stage.eliminated, 2);
    assert_eq!(provider.large_trade_calls.load(Ordering::Relaxed), 1);
    assert_eq!(provider.announcement_calls.load(Ordering::Relaxed), 0);
}

#[tokio::test]
async fn test_sector_falls_back_to_security_info() {
    let mut listed = passing("000001.SZ", 12.0, 200_000.0, 0.9);
    listed.security.industry = None;
    let mut cold = passing("000002.SZ", 12.0, 200_000.0, 0.9);
    cold.security.industry = None;
    cold.info_industry = Some("银行".into());

    let provider = Arc::new(MockProvider::new(vec![listed, cold]));
    let (_dir, store) = create_store();
    let outcome = pipeline(provider.clone(), store).run(trade_date()).await.unwrap();

    assert_eq!(provider.info_calls.load(Ordering::Relaxed), 2);
    assert_eq!(outcome.selected.len(), 1);
    assert_eq!(outcome.selected[0].industry, "半导体");
}

#[tokio::test]
async fn test_universe_failure_fails_run() {
    let mut provider = MockProvider::new(vec![passing("000001.SZ", 12.0, 200_000.0, 0.9)]);
    provider.fail_universe = true;
    let (_dir, store) = create_store();

    let result = pipeline(Arc::new(provider), store).run(trade_date()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (_dir, store) = create_store();
    let records: Vec<SelectionRecord> = (0..5)
        .map(|i| SelectionRecord {
            trade_date: trade_date(),
            ts_code: format!("00000{}.SZ", i),
            score: 1.5 + i as f64 * 0.1,
        })
        .collect();

    let first = persist_all(store.as_ref(), &records).await;
    assert_eq!(first.stored, 5);

    let rescored: Vec<SelectionRecord> = records
        .iter()
        .map(|r| SelectionRecord {
            score: r.score + 1.0,
            ..r.clone()
        })
        .collect();
    let second = persist_all(store.as_ref(), &rescored).await;
    assert_eq!(second.stored, 5);

    let stored = store.load(trade_date()).await.unwrap();
    assert_eq!(stored.len(), 5);
    for record in &rescored {
        let row = stored.iter().find(|s| s.ts_code == record.ts_code).unwrap();
        assert_eq!(row.score, record.score);
    }
}

/// Store that refuses every write.
struct ReadOnlyStore;

#[async_trait]
impl SelectionStore for ReadOnlyStore {
    fn name(&self) -> &'static str {
        "read-only"
    }

    async fn upsert(&self, _record: &SelectionRecord) -> Result<(), StoreError> {
        Err(StoreError::Database("attempt to write a readonly database".into()))
    }

    async fn load(&self, _trade_date: NaiveDate) -> Result<Vec<SelectionRecord>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn test_persistence_failures_are_reported_not_fatal() {
    let provider = Arc::new(MockProvider::new(vec![
        passing("000001.SZ", 12.0, 200_000.0, 0.9),
        passing("000002.SZ", 14.0, 200_000.0, 0.9),
    ]));

    let outcome = pipeline(provider, Arc::new(ReadOnlyStore))
        .run(trade_date())
        .await
        .unwrap();

    assert_eq!(outcome.selected.len(), 2);
    assert_eq!(outcome.persist.stored, 0);
    assert_eq!(outcome.persist.failures.len(), 2);
    assert!(outcome.render_table().contains("保存失败"));
}

#[tokio::test]
async fn test_panic_in_one_security_does_not_abort_scan() {
    let mut broken = passing("000001.SZ", 12.0, 200_000.0, 0.9);
    broken.announcements = vec![announcement("000001.SZ", Some("乱码"))];
    let healthy = passing("000002.SZ", 12.0, 200_000.0, 0.9);

    let provider = Arc::new(MockProvider::new(vec![broken.clone(), healthy]));
    let (_dir, store) = create_store();
    let pipeline = SelectionPipeline::with_scorer(
        provider.clone(),
        store.clone(),
        ScreenerConfig::default(),
        Arc::new(PanickingScorer),
    );

    match pipeline.evaluate_security(&broken.security, trade_date()).await {
        Verdict::Rejected(r) => {
            assert_eq!(r.stage, GateStage::Sentiment);
            assert_eq!(
                r.reason,
                RejectReason::Aborted("unsupported encoding in announcement".into())
            );
        }
        Verdict::Scored(_) => panic!("expected rejection"),
    }

    let outcome = pipeline.run(trade_date()).await.unwrap();
    assert_eq!(outcome.scanned, 2);
    assert_eq!(outcome.selected.len(), 1);
    assert_eq!(outcome.selected[0].ts_code, "000002.SZ");
    let sentiment = outcome
        .funnel
        .iter()
        .find(|s| s.stage == GateStage::Sentiment)
        .unwrap();
    assert_eq!(sentiment.eliminated, 1);

    let stored = store.load(trade_date()).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].ts_code, "000002.SZ");
}

#[tokio::test]
async fn test_run_can_be_spawned() {
    let provider = Arc::new(MockProvider::new(vec![
        passing("000001.SZ", 12.0, 200_000.0, 0.9),
        passing("000002.SZ", 14.0, 200_000.0, 0.9),
    ]));
    let (_dir, store) = create_store();
    let pipeline = Arc::new(pipeline(provider, store));

    let handle = tokio::spawn({
        let pipeline = Arc::clone(&pipeline);
        async move { pipeline.run(trade_date()).await }
    });

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.selected.len(), 2);
    assert_eq!(outcome.selected[0].ts_code, "000002.SZ");
}
