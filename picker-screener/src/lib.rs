//! Picker Screener Library
//!
//! Daily multi-factor screening of A-shares. Each trading day the universe is
//! run through six gates, survivors are scored, and the top five are upserted
//! into the selection store.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         SelectionPipeline                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  technical → fundamental → money flow → large trade → sentiment  │
//! │            → sector → composite score → rank top-K → persist     │
//! └──────────────┬──────────────────────────────────┬────────────────┘
//!                │                                  │
//!      ┌─────────▼─────────┐              ┌─────────▼─────────┐
//!      │ MarketDataProvider│              │  SelectionStore   │
//!      │   (Tushare Pro)   │              │ SQLite / Supabase │
//!      └───────────────────┘              └───────────────────┘
//! ```
//!
//! # Scoring
//!
//! `score = 1.0 × golden_cross + 0.5 × ROE/20 + 0.5 × net_inflow/1e6 + 0.5 × sentiment`
//! with every weight and scale configurable under `screener.weights`.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod factors;
pub mod selection;
pub mod storage;

pub use data::{MarketDataProvider, ProviderError, TushareAdapter};
pub use selection::{Candidate, SelectionOutcome, SelectionPipeline};
pub use storage::{open_store, PersistReport, SelectionRecord, SelectionStore};
