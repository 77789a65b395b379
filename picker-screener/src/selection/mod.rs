//! Selection run: gate chain, ranking, persistence and reporting.

mod funnel;
mod pipeline;
mod report;

pub use funnel::{tally, GateStage, RejectReason, Rejection, StageStats};
pub use pipeline::{composite_score, rank, SelectionPipeline, Verdict};
pub use report::{Candidate, SelectionOutcome};
