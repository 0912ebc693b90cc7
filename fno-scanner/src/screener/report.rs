//! Summary statistics and post-screen validation of a candidate list.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::config::FilterConfig;
use super::engine::FilteredCandidate;
use super::scoring::DataQuality;
use crate::data::effective_prev_day_high;

/// How many candidates the summary lists by score.
pub const TOP_PERFORMERS: usize = 5;

// ============================================================================
// Filter Summary
// ============================================================================

/// Thresholds echoed into a summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub min_percentage_increase: f64,
    pub min_volume: u64,
    pub price_range: (f64, f64),
    pub gap_range: (f64, f64),
    pub change_range: (f64, f64),
}

impl From<&FilterConfig> for FilterCriteria {
    fn from(config: &FilterConfig) -> Self {
        Self {
            min_percentage_increase: config.min_percentage_increase,
            min_volume: config.min_volume,
            price_range: (config.price_bounds.min, config.price_bounds.max),
            gap_range: (config.gap_bounds.min, config.gap_bounds.max),
            change_range: (config.change_bounds.min, config.change_bounds.max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPerformer {
    pub symbol: String,
    pub percentage_change: f64,
    pub gap_up_percentage: f64,
    pub filter_score: f64,
    pub data_quality: DataQuality,
}

/// Aggregate view of one screen's candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSummary {
    pub total_filtered: usize,
    pub avg_percentage_change: f64,
    pub avg_gap_up_percentage: f64,
    pub avg_volume: f64,
    pub avg_filter_score: f64,
    pub max_percentage_change: f64,
    pub min_percentage_change: f64,
    pub data_quality_distribution: BTreeMap<DataQuality, usize>,
    /// Keyed by the full provenance string
    pub source_distribution: BTreeMap<String, usize>,
    /// Highest filter score first
    pub top_performers: Vec<TopPerformer>,
    pub filter_criteria: FilterCriteria,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl FilterSummary {
    pub fn from_candidates(candidates: &[FilteredCandidate], config: &FilterConfig) -> Self {
        let n = candidates.len();
        let avg = |f: fn(&FilteredCandidate) -> f64| -> f64 {
            if n == 0 {
                0.0
            } else {
                round2(candidates.iter().map(f).sum::<f64>() / n as f64)
            }
        };

        let mut data_quality_distribution = BTreeMap::new();
        let mut source_distribution = BTreeMap::new();
        for c in candidates {
            *data_quality_distribution.entry(c.data_quality).or_insert(0) += 1;
            *source_distribution.entry(c.record.source.clone()).or_insert(0) += 1;
        }

        let mut ranked: Vec<&FilteredCandidate> = candidates.iter().collect();
        ranked.sort_by(|a, b| {
            b.filter_score
                .partial_cmp(&a.filter_score)
                .unwrap_or(Ordering::Equal)
        });
        let top_performers = ranked
            .into_iter()
            .take(TOP_PERFORMERS)
            .map(|c| TopPerformer {
                symbol: c.record.symbol.clone(),
                percentage_change: c.percentage_change,
                gap_up_percentage: c.gap_up_percentage,
                filter_score: c.filter_score,
                data_quality: c.data_quality,
            })
            .collect();

        let changes = candidates.iter().map(|c| c.percentage_change);
        let (max_percentage_change, min_percentage_change) = if n == 0 {
            (0.0, 0.0)
        } else {
            (
                changes.clone().fold(f64::MIN, f64::max),
                changes.fold(f64::MAX, f64::min),
            )
        };

        Self {
            total_filtered: n,
            avg_percentage_change: avg(|c| c.percentage_change),
            avg_gap_up_percentage: avg(|c| c.gap_up_percentage),
            avg_volume: avg(|c| c.record.volume as f64),
            avg_filter_score: avg(|c| c.filter_score),
            max_percentage_change,
            min_percentage_change,
            data_quality_distribution,
            source_distribution,
            top_performers,
            filter_criteria: FilterCriteria::from(config),
        }
    }
}

// ============================================================================
// Result Validation
// ============================================================================

/// Violations found on one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateIssue {
    pub symbol: String,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultValidation {
    pub total: usize,
    pub valid: usize,
    pub issues: Vec<CandidateIssue>,
}

impl ResultValidation {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

const SYNTHETIC_MARKERS: [&str; 3] = ["synthetic", "fake", "generated"];

fn candidate_issues(c: &FilteredCandidate, config: &FilterConfig) -> Vec<String> {
    let r = &c.record;
    let mut issues = Vec::new();

    let source = r.source.to_lowercase();
    if SYNTHETIC_MARKERS.iter().any(|m| source.contains(m)) {
        issues.push(format!("synthetic source: {}", r.source));
    }

    if r.symbol.trim().is_empty() {
        issues.push("missing symbol".to_string());
    }
    for (field, value) in [
        ("ltp", r.ltp),
        ("open_price", r.open_price),
        ("prev_close", r.prev_close),
    ] {
        if !(value > 0.0) {
            issues.push(format!("missing {}", field));
        }
    }
    if !c.percentage_change.is_finite() {
        issues.push("missing percentage_change".to_string());
    }
    if !c.gap_up_percentage.is_finite() {
        issues.push("missing gap_up_percentage".to_string());
    }

    match effective_prev_day_high(r) {
        Some((high, _)) if r.open_price > high => {}
        Some((high, _)) => issues.push(format!("open {} not above reference high {}", r.open_price, high)),
        None => issues.push("no previous-day reference".to_string()),
    }
    if c.percentage_change < config.min_percentage_increase {
        issues.push(format!(
            "percentage change {} below {}",
            c.percentage_change, config.min_percentage_increase
        ));
    }
    if r.volume <= config.min_volume {
        issues.push(format!("volume {} not above {}", r.volume, config.min_volume));
    }

    if c.data_quality == DataQuality::Poor {
        issues.push("poor data quality".to_string());
    }

    issues
}

/// Re-check every candidate against the gate and output-field requirements.
pub fn validate_results(candidates: &[FilteredCandidate], config: &FilterConfig) -> ResultValidation {
    let mut validation = ResultValidation {
        total: candidates.len(),
        ..Default::default()
    };

    for c in candidates {
        let issues = candidate_issues(c, config);
        if issues.is_empty() {
            validation.valid += 1;
        } else {
            debug!(symbol = %c.record.symbol, issues = ?issues, "Candidate failed validation");
            validation.issues.push(CandidateIssue {
                symbol: c.record.symbol.clone(),
                issues,
            });
        }
    }

    if !validation.is_clean() {
        warn!(
            total = validation.total,
            valid = validation.valid,
            flagged = validation.issues.len(),
            "Screen produced candidates with issues"
        );
    }
    validation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Provenance, QuoteRecord};
    use crate::screener::ScreenerEngine;

    fn record(symbol: &str, open: f64, ltp: f64, volume: u64, total_oi: u64, source: &str) -> QuoteRecord {
        QuoteRecord {
            symbol: symbol.into(),
            open_price: open,
            ltp,
            prev_close: 100.0,
            prev_day_high: 105.0,
            volume,
            total_oi,
            source: source.into(),
            prev_day_provenance: Provenance::Sourced,
            ..Default::default()
        }
    }

    fn candidates() -> Vec<FilteredCandidate> {
        let records = vec![
            record("ABC", 110.0, 112.0, 5000, 0, "nse_api"),
            record("DEF", 107.0, 120.0, 200_000, 9000, "nse_api,fyers"),
            record("GHI", 108.0, 109.0, 60_000, 0, "yfinance"),
        ];
        ScreenerEngine::default().screen(&records).candidates
    }

    #[test]
    fn test_summary_statistics() {
        let summary = FilterSummary::from_candidates(&candidates(), &FilterConfig::default());
        assert_eq!(summary.total_filtered, 3);
        assert_eq!(summary.max_percentage_change, 20.0);
        assert_eq!(summary.min_percentage_change, 9.0);
        assert!((summary.avg_percentage_change - 13.67).abs() < 1e-9);
        assert_eq!(summary.source_distribution.get("nse_api,fyers"), Some(&1));
        assert_eq!(summary.data_quality_distribution.get(&DataQuality::Good), Some(&1));
        assert_eq!(summary.filter_criteria.min_volume, 1000);

        let top: Vec<_> = summary.top_performers.iter().map(|t| t.symbol.as_str()).collect();
        assert_eq!(top, vec!["DEF", "ABC", "GHI"]);
    }

    #[test]
    fn test_summary_of_nothing() {
        let summary = FilterSummary::from_candidates(&[], &FilterConfig::default());
        assert_eq!(summary.total_filtered, 0);
        assert_eq!(summary.avg_filter_score, 0.0);
        assert!(summary.top_performers.is_empty());
    }

    #[test]
    fn test_screened_candidates_validate_clean() {
        let validation = validate_results(&candidates(), &FilterConfig::default());
        assert_eq!(validation.total, 3);
        assert_eq!(validation.valid, 3);
        assert!(validation.is_clean());
    }

    #[test]
    fn test_tampered_candidate_is_flagged() {
        let mut list = candidates();
        list[0].record.source = "synthetic_fill".into();
        list[0].record.open_price = 100.0;
        list[0].data_quality = DataQuality::Poor;

        let validation = validate_results(&list, &FilterConfig::default());
        assert_eq!(validation.valid, 2);
        let issue = &validation.issues[0];
        assert_eq!(issue.symbol, "DEF");
        assert_eq!(issue.issues.len(), 3);
    }
}
