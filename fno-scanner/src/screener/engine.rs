//! Screener engine module.
//!
//! Runs the gate and scoring stages over one cycle's consolidated records.

use chrono::{DateTime, Utc};
use fno_common::config::Config;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info, warn};

use super::config::FilterConfig;
use super::filter::{FilterResult, FilterStage, GapUpGate, GateMetrics, GateStats};
use super::report::FilterSummary;
use super::scoring::{assess_data_quality, filter_score, DataQuality};
use crate::data::QuoteRecord;

// ============================================================================
// Filtered Candidate
// ============================================================================

/// A consolidated record that passed the gate, with derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredCandidate {
    #[serde(flatten)]
    pub record: QuoteRecord,
    /// Change of LTP over previous close (%)
    pub percentage_change: f64,
    /// Open over previous-day high (%)
    pub gap_up_percentage: f64,
    /// LTP minus open
    pub day_change: f64,
    /// Change of LTP over open (%)
    pub day_change_percentage: f64,
    pub filter_score: f64,
    pub data_quality: DataQuality,
    pub filter_timestamp: DateTime<Utc>,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl FilteredCandidate {
    /// Build a candidate from a gated record.
    ///
    /// Fails when any derived value is not finite.
    pub fn build(record: &QuoteRecord, metrics: &GateMetrics, at: DateTime<Utc>) -> Result<Self, String> {
        let score = filter_score(
            metrics.gap_up_percentage,
            metrics.percentage_change,
            record.volume,
            record.total_oi,
        )
        .ok_or_else(|| "non-finite gap or change".to_string())?;

        let day_change = record.ltp - record.open_price;
        let day_change_percentage = if record.open_price > 0.0 {
            day_change / record.open_price * 100.0
        } else {
            0.0
        };
        if !day_change.is_finite() || !day_change_percentage.is_finite() {
            return Err("non-finite day change".to_string());
        }

        Ok(Self {
            record: record.clone(),
            percentage_change: round2(metrics.percentage_change),
            gap_up_percentage: round2(metrics.gap_up_percentage),
            day_change: round2(day_change),
            day_change_percentage: round2(day_change_percentage),
            filter_score: score,
            data_quality: assess_data_quality(record),
            filter_timestamp: at,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.record.symbol
    }
}

// ============================================================================
// Screener Result
// ============================================================================

/// Result of a screening operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerResult {
    /// Candidates, highest percentage change first
    pub candidates: Vec<FilteredCandidate>,
    /// Filter stage results
    pub filter_results: Vec<FilterResult>,
    pub gate_stats: GateStats,
    /// Gated records dropped because scoring failed
    pub scoring_failures: usize,
    /// Records handed to the screen
    pub total_scanned: usize,
    /// Thresholds used
    pub config: FilterConfig,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

fn by_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

impl ScreenerResult {
    /// Candidates ordered by percentage change, highest first.
    pub fn by_percentage_change(&self) -> Vec<&FilteredCandidate> {
        let mut out: Vec<_> = self.candidates.iter().collect();
        out.sort_by(|a, b| by_desc(a.percentage_change, b.percentage_change));
        out
    }

    /// Top `n` candidates by filter score.
    pub fn top_by_score(&self, n: usize) -> Vec<&FilteredCandidate> {
        let mut out: Vec<_> = self.candidates.iter().collect();
        out.sort_by(|a, b| by_desc(a.filter_score, b.filter_score));
        out.truncate(n);
        out
    }

    /// Candidates with at least `min` data quality.
    pub fn by_quality(&self, min: DataQuality) -> Vec<&FilteredCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.data_quality >= min)
            .collect()
    }

    /// Candidates whose provenance mentions `source` (case-insensitive).
    pub fn by_source(&self, source: &str) -> Vec<&FilteredCandidate> {
        let needle = source.to_lowercase();
        self.candidates
            .iter()
            .filter(|c| c.record.source.to_lowercase().contains(&needle))
            .collect()
    }

    pub fn with_open_interest(&self) -> Vec<&FilteredCandidate> {
        self.candidates
            .iter()
            .filter(|c| c.record.total_oi > 0)
            .collect()
    }

    pub fn summary(&self) -> FilterSummary {
        FilterSummary::from_candidates(&self.candidates, &self.config)
    }

    /// Summary string for logging.
    pub fn summary_line(&self) -> String {
        let rate = if self.total_scanned > 0 {
            self.candidates.len() as f64 / self.total_scanned as f64 * 100.0
        } else {
            0.0
        };
        format!(
            "Screened {} records: {} passed ({:.1}%)",
            self.total_scanned,
            self.candidates.len(),
            rate
        )
    }
}

// ============================================================================
// Screener Engine
// ============================================================================

/// Gate-then-score screen over consolidated records.
#[derive(Debug, Clone, Default)]
pub struct ScreenerEngine {
    gate: GapUpGate,
}

impl ScreenerEngine {
    pub fn new(config: FilterConfig) -> Self {
        Self {
            gate: GapUpGate::new(config),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(FilterConfig::from(&config.strategy))
    }

    pub fn config(&self) -> &FilterConfig {
        self.gate.config()
    }

    /// Screen one cycle's records. Never fails; bad records are skipped.
    pub fn screen(&self, records: &[QuoteRecord]) -> ScreenerResult {
        let started_at = Utc::now();
        let (gated, gate_stats, gate_result) = self.gate.apply(records);

        let mut candidates = Vec::with_capacity(gated.len());
        let mut scoring_failures = 0;
        for (record, metrics) in &gated {
            match FilteredCandidate::build(record, metrics, started_at) {
                Ok(candidate) => {
                    debug!(
                        symbol = %candidate.record.symbol,
                        gap = candidate.gap_up_percentage,
                        change = candidate.percentage_change,
                        score = candidate.filter_score,
                        quality = %candidate.data_quality,
                        "Candidate passed"
                    );
                    candidates.push(candidate);
                }
                Err(reason) => {
                    scoring_failures += 1;
                    warn!(symbol = %record.symbol, reason = %reason, "Skipping record, scoring failed");
                }
            }
        }

        candidates.sort_by(|a, b| by_desc(a.percentage_change, b.percentage_change));

        let filter_results = vec![
            FilterResult::new(FilterStage::Input, records.len(), records.len()),
            gate_result,
            FilterResult::new(FilterStage::Scoring, gated.len(), candidates.len()),
        ];

        let result = ScreenerResult {
            candidates,
            filter_results,
            gate_stats,
            scoring_failures,
            total_scanned: records.len(),
            config: self.gate.config().clone(),
            started_at,
            completed_at: Utc::now(),
        };

        info!(
            scanned = result.total_scanned,
            passed = result.candidates.len(),
            threshold = result.config.min_percentage_increase,
            "{}",
            result.summary_line()
        );
        for (i, c) in result.candidates.iter().take(3).enumerate() {
            info!(
                rank = i + 1,
                symbol = %c.record.symbol,
                change = c.percentage_change,
                gap = c.gap_up_percentage,
                quality = %c.data_quality,
                source = %c.record.source,
                "Top performer"
            );
        }

        result
    }
}
