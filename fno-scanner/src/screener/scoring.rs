//! Candidate ranking score and data-quality label.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::data::{Provenance, QuoteRecord};

/// Cap on each of the gap and momentum contributions.
pub const COMPONENT_CAP: f64 = 40.0;

/// Flat bonus when open interest is known.
pub const OPEN_INTEREST_POINTS: f64 = 10.0;

// ============================================================================
// Filter Score
// ============================================================================

/// Stepped volume contribution.
pub fn volume_points(volume: u64) -> f64 {
    match volume {
        v if v > 100_000 => 10.0,
        v if v > 50_000 => 7.0,
        v if v > 10_000 => 5.0,
        v if v > 1_000 => 2.0,
        _ => 0.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Additive ranking score, rounded to two decimals.
///
/// Returns `None` when either percentage is not finite.
pub fn filter_score(gap_up_percentage: f64, percentage_change: f64, volume: u64, total_oi: u64) -> Option<f64> {
    if !gap_up_percentage.is_finite() || !percentage_change.is_finite() {
        return None;
    }

    let oi = if total_oi > 0 { OPEN_INTEREST_POINTS } else { 0.0 };
    let score = (gap_up_percentage * 2.0).min(COMPONENT_CAP)
        + (percentage_change * 2.0).min(COMPONENT_CAP)
        + volume_points(volume)
        + oi;
    Some(round2(score))
}

// ============================================================================
// Data Quality
// ============================================================================

/// Ordinal confidence in a candidate's inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataQuality {
    Poor,
    Fair,
    Good,
    Excellent,
}

impl DataQuality {
    /// Bucket quality points: ≥8 excellent, ≥6 good, ≥4 fair.
    pub fn from_points(points: u32) -> Self {
        match points {
            p if p >= 8 => Self::Excellent,
            p if p >= 6 => Self::Good,
            p if p >= 4 => Self::Fair,
            _ => Self::Poor,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poor => "POOR",
            Self::Fair => "FAIR",
            Self::Good => "GOOD",
            Self::Excellent => "EXCELLENT",
        }
    }
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataQuality {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "POOR" => Ok(Self::Poor),
            "FAIR" => Ok(Self::Fair),
            "GOOD" => Ok(Self::Good),
            "EXCELLENT" => Ok(Self::Excellent),
            _ => Err(format!("Unknown data quality: {}", s)),
        }
    }
}

/// Provider name without qualifiers (`nse_api:prev_est` -> `nse_api`).
fn base_source(tag: &str) -> &str {
    tag.split(':').next().unwrap_or(tag)
}

/// Trust weight of one provenance tag.
pub fn source_trust(tag: &str) -> u32 {
    match base_source(tag) {
        "nse_api" | "nse_toolkit" | "fyers" => 3,
        "yfinance" => 2,
        _ => 1,
    }
}

/// Additive quality points for a record.
pub fn quality_points(record: &QuoteRecord) -> u32 {
    let trust = record.source_tags().map(source_trust).max().unwrap_or(1);
    let mut points = trust;

    if record.prev_day_provenance == Provenance::Sourced && record.prev_day_high > 0.0 {
        points += 2;
    }
    if record.volume > 1000 {
        points += 1;
    }
    if record.total_oi > 0 {
        points += 2;
    }

    let distinct: HashSet<&str> = record.source_tags().map(base_source).collect();
    if distinct.len() >= 2 {
        points += 2;
    }

    points
}

pub fn assess_data_quality(record: &QuoteRecord) -> DataQuality {
    DataQuality::from_points(quality_points(record))
}
