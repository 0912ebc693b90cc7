//! Gap-up screener.
//!
//! Turns one cycle's consolidated quote records into ranked candidates.
//!
//! # Architecture
//!
//! ```text
//! consolidated records
//!        │
//!        ▼
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Gap-up     │────▶│  Scoring    │────▶│  Summary /  │
//! │  gate       │     │  + quality  │     │  validation │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use fno_scanner::screener::{FilterConfig, ScreenerEngine};
//!
//! let engine = ScreenerEngine::new(FilterConfig::default());
//! let result = engine.screen(&records);
//! for candidate in result.top_by_score(5) {
//!     println!("{} {}", candidate.symbol(), candidate.filter_score);
//! }
//! ```

pub mod config;
pub mod engine;
pub mod filter;
pub mod report;
pub mod scoring;
pub mod signals;

pub use config::FilterConfig;
pub use engine::{FilteredCandidate, ScreenerEngine, ScreenerResult};
pub use filter::{FilterResult, FilterStage, GapUpGate, GateCriterion, GateMetrics, GateStats};
pub use report::{
    validate_results, CandidateIssue, FilterCriteria, FilterSummary, ResultValidation, TopPerformer,
};
pub use scoring::{assess_data_quality, filter_score, quality_points, source_trust, DataQuality};
pub use signals::{oi_change_pct, Signal, SignalDetector, TradeSignal};
