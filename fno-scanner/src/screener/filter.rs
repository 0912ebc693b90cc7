//! Gate stage of the gap-up screen.
//!
//! A consolidated record becomes a candidate only if all of these hold:
//! 1. Gap-up: `open_price` above the previous day's high
//! 2. Momentum: percentage change over previous close at least the threshold
//! 3. Volume: strictly above the floor
//! 4. Price sanity: LTP within the configured band
//! 5. Gap bound: gap-up percentage within the configured band
//! 6. Change bound: percentage change within the configured band

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use super::config::FilterConfig;
use crate::data::{effective_prev_day_high, QuoteRecord};

// ============================================================================
// Filter Stage
// ============================================================================

/// Filter stage identifier for tracking where records are eliminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterStage {
    /// Consolidated records handed to the screen
    Input,
    /// Gap-up gate
    Gate,
    /// Score computation (drops records with non-finite metrics)
    Scoring,
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Gate => write!(f, "gate"),
            Self::Scoring => write!(f, "scoring"),
        }
    }
}

// ============================================================================
// Filter Result
// ============================================================================

/// Result of a filtering stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterResult {
    /// Stage name
    pub stage: FilterStage,
    /// Number of records that passed this stage
    pub passed: usize,
    /// Number of records eliminated at this stage
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterResult {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };

        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

// ============================================================================
// Gate Criteria
// ============================================================================

/// The first gate condition a record failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateCriterion {
    /// Neither previous-day high nor previous close is usable
    MissingReference,
    GapUp,
    Momentum,
    Volume,
    PriceRange,
    GapBounds,
    ChangeBounds,
}

impl fmt::Display for GateCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::MissingReference => "no previous-day reference",
            Self::GapUp => "no gap up",
            Self::Momentum => "low momentum",
            Self::Volume => "low volume",
            Self::PriceRange => "price out of range",
            Self::GapBounds => "unreasonable gap",
            Self::ChangeBounds => "unreasonable change",
        };
        write!(f, "{}", s)
    }
}

/// Per-criterion rejection counts for one gate pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateStats {
    pub evaluated: usize,
    pub passed: usize,
    pub missing_reference: usize,
    pub no_gap_up: usize,
    pub low_momentum: usize,
    pub low_volume: usize,
    pub price_out_of_range: usize,
    pub unreasonable_gap: usize,
    pub unreasonable_change: usize,
    /// Records whose gap was measured against previous close
    pub substituted_reference: usize,
}

impl GateStats {
    fn reject(&mut self, criterion: GateCriterion) {
        let slot = match criterion {
            GateCriterion::MissingReference => &mut self.missing_reference,
            GateCriterion::GapUp => &mut self.no_gap_up,
            GateCriterion::Momentum => &mut self.low_momentum,
            GateCriterion::Volume => &mut self.low_volume,
            GateCriterion::PriceRange => &mut self.price_out_of_range,
            GateCriterion::GapBounds => &mut self.unreasonable_gap,
            GateCriterion::ChangeBounds => &mut self.unreasonable_change,
        };
        *slot += 1;
    }

    pub fn rejected(&self) -> usize {
        self.evaluated - self.passed
    }
}

/// Derived values computed while gating a record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateMetrics {
    /// Previous-day high the gap was measured against
    pub reference_high: f64,
    /// True when `reference_high` was derived from previous close
    pub substituted: bool,
    pub gap_up_percentage: f64,
    pub percentage_change: f64,
}

// ============================================================================
// Gap-Up Gate
// ============================================================================

/// Pure predicate over consolidated records.
#[derive(Debug, Clone)]
pub struct GapUpGate {
    config: FilterConfig,
}

impl Default for GapUpGate {
    fn default() -> Self {
        Self::new(FilterConfig::default())
    }
}

impl GapUpGate {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Evaluate every condition, returning the first that fails.
    pub fn evaluate(&self, record: &QuoteRecord) -> Result<GateMetrics, GateCriterion> {
        let (reference_high, substituted) =
            effective_prev_day_high(record).ok_or(GateCriterion::MissingReference)?;
        if substituted {
            debug!(
                symbol = %record.symbol,
                prev_close = record.prev_close,
                "prev_day_high missing, using prev_close as reference"
            );
        }

        let percentage_change = record
            .percentage_change()
            .ok_or(GateCriterion::MissingReference)?;
        let gap_up_percentage = (record.open_price - reference_high) / reference_high * 100.0;
        let c = &self.config;

        if !(record.open_price > reference_high) {
            return Err(GateCriterion::GapUp);
        }
        if !(percentage_change >= c.min_percentage_increase) {
            return Err(GateCriterion::Momentum);
        }
        if record.volume <= c.min_volume {
            return Err(GateCriterion::Volume);
        }
        if !c.price_bounds.contains(record.ltp) {
            return Err(GateCriterion::PriceRange);
        }
        if !c.gap_bounds.contains(gap_up_percentage) {
            return Err(GateCriterion::GapBounds);
        }
        if !c.change_bounds.contains(percentage_change) {
            return Err(GateCriterion::ChangeBounds);
        }

        Ok(GateMetrics {
            reference_high,
            substituted,
            gap_up_percentage,
            percentage_change,
        })
    }

    pub fn passes(&self, record: &QuoteRecord) -> bool {
        self.evaluate(record).is_ok()
    }

    /// Gate a record set, keeping input order.
    pub fn apply<'a>(
        &self,
        records: &'a [QuoteRecord],
    ) -> (Vec<(&'a QuoteRecord, GateMetrics)>, GateStats, FilterResult) {
        let mut stats = GateStats {
            evaluated: records.len(),
            ..Default::default()
        };
        let mut passed = Vec::new();

        for record in records {
            match self.evaluate(record) {
                Ok(metrics) => {
                    if metrics.substituted {
                        stats.substituted_reference += 1;
                    }
                    passed.push((record, metrics));
                }
                Err(criterion) => {
                    debug!(symbol = %record.symbol, reason = %criterion, "Gate rejected");
                    stats.reject(criterion);
                }
            }
        }

        stats.passed = passed.len();
        let result = FilterResult::new(FilterStage::Gate, records.len(), passed.len());
        (passed, stats, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn scenario_one() -> QuoteRecord {
        QuoteRecord {
            symbol: "ABC".into(),
            open_price: 110.0,
            ltp: 112.0,
            prev_close: 100.0,
            prev_day_high: 105.0,
            volume: 5000,
            total_oi: 0,
            source: "nse_api".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_scenario_one_passes() {
        let metrics = GapUpGate::default().evaluate(&scenario_one()).unwrap();
        assert!((metrics.gap_up_percentage - 4.761904).abs() < 1e-5);
        assert!((metrics.percentage_change - 12.0).abs() < 1e-9);
        assert!(!metrics.substituted);
    }

    #[test]
    fn test_missing_high_substitutes_prev_close() {
        let mut r = scenario_one();
        r.prev_day_high = 0.0;
        r.open_price = 108.0;
        r.ltp = 108.0;
        let metrics = GapUpGate::default().evaluate(&r).unwrap();
        assert_eq!(metrics.reference_high, 100.0);
        assert!(metrics.substituted);
        assert!((metrics.gap_up_percentage - 8.0).abs() < 1e-9);
    }

    #[test_case(|r: &mut QuoteRecord| r.open_price = 105.0, GateCriterion::GapUp; "open equals high")]
    #[test_case(|r: &mut QuoteRecord| r.ltp = 106.9, GateCriterion::Momentum; "below threshold")]
    #[test_case(|r: &mut QuoteRecord| r.volume = 1000, GateCriterion::Volume; "volume at floor")]
    #[test_case(|r: &mut QuoteRecord| { r.prev_close = 8.0; r.ltp = 9.0; r.open_price = 9.0; r.prev_day_high = 8.5 }, GateCriterion::PriceRange; "penny stock")]
    #[test_case(|r: &mut QuoteRecord| r.open_price = 140.0, GateCriterion::GapBounds; "gap too wide")]
    #[test_case(|r: &mut QuoteRecord| { r.prev_close = 50.0; r.prev_day_high = 100.0; r.open_price = 110.0 }, GateCriterion::ChangeBounds; "change too large")]
    #[test_case(|r: &mut QuoteRecord| { r.prev_close = 0.0; r.prev_day_high = 0.0 }, GateCriterion::MissingReference; "no reference")]
    fn test_rejections(mutate: fn(&mut QuoteRecord), expected: GateCriterion) {
        let mut r = scenario_one();
        mutate(&mut r);
        assert_eq!(GapUpGate::default().evaluate(&r), Err(expected));
    }

    #[test]
    fn test_apply_counts_rejections() {
        let mut low_volume = scenario_one();
        low_volume.symbol = "LOW".into();
        low_volume.volume = 10;
        let mut no_gap = scenario_one();
        no_gap.symbol = "FLAT".into();
        no_gap.open_price = 100.0;

        let records = vec![scenario_one(), low_volume, no_gap];
        let (passed, stats, result) = GapUpGate::default().apply(&records);

        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].0.symbol, "ABC");
        assert_eq!(stats.evaluated, 3);
        assert_eq!(stats.low_volume, 1);
        assert_eq!(stats.no_gap_up, 1);
        assert_eq!(stats.rejected(), 2);
        assert_eq!(result.eliminated, 2);
        assert!((result.elimination_rate - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let gate = GapUpGate::new(FilterConfig::default().with_min_percentage_increase(15.0));
        assert_eq!(gate.evaluate(&scenario_one()), Err(GateCriterion::Momentum));
    }
}
