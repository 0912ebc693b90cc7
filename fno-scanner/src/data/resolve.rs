//! Ordered resolution of derived fields with provenance.
//!
//! Previous-session OHLC and open interest are filled by trying a chain of
//! lookups. Each step returns a [`Resolution`] so the caller always knows
//! whether a value was read from a provider or estimated.
//!
//! # Estimate policy
//!
//! When no historical row is available the previous session is estimated
//! from the previous close with fixed ratios. The gate stage uses the same
//! high ratio when it substitutes a missing previous-day high, so the two
//! paths can never disagree.

use super::{Provenance, QuoteRecord};

/// Previous-day high estimate as a multiple of previous close.
pub const PREV_HIGH_RATIO: f64 = 1.0;
/// Previous-day open estimate as a multiple of previous close.
pub const PREV_OPEN_RATIO: f64 = 0.995;
/// Previous-day low estimate as a multiple of previous close.
pub const PREV_LOW_RATIO: f64 = 0.985;

/// Tag suffix appended to a source name when its previous-day values are estimated.
pub const ESTIMATE_TAG_SUFFIX: &str = ":prev_est";

// ============================================================================
// Resolution
// ============================================================================

/// Outcome of a resolution step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution<T> {
    /// Read from a provider
    Sourced(T),
    /// Approximated from other fields
    Estimated(T),
    /// Nothing available
    Absent,
}

impl<T> Resolution<T> {
    /// Provenance label for this outcome.
    pub fn provenance(&self) -> Provenance {
        match self {
            Self::Sourced(_) => Provenance::Sourced,
            Self::Estimated(_) => Provenance::Estimated,
            Self::Absent => Provenance::Absent,
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Sourced(v) | Self::Estimated(v) => Some(v),
            Self::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Try the next step only when nothing has been resolved yet.
    pub fn or_else<F>(self, next: F) -> Self
    where
        F: FnOnce() -> Self,
    {
        match self {
            Self::Absent => next(),
            resolved => resolved,
        }
    }

    pub fn map<U, F>(self, f: F) -> Resolution<U>
    where
        F: FnOnce(T) -> U,
    {
        match self {
            Self::Sourced(v) => Resolution::Sourced(f(v)),
            Self::Estimated(v) => Resolution::Estimated(f(v)),
            Self::Absent => Resolution::Absent,
        }
    }
}

impl<T> From<Option<T>> for Resolution<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Absent, Self::Sourced)
    }
}

// ============================================================================
// Previous Session OHLC
// ============================================================================

/// Previous trading session prices.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrevDayOhlc {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl PrevDayOhlc {
    /// All prices positive and the range ordered.
    pub fn is_plausible(&self) -> bool {
        self.open > 0.0 && self.high > 0.0 && self.low > 0.0 && self.low <= self.high
    }

    /// Wrap a provider row, discarding zero-filled or inverted rows.
    pub fn sourced(self) -> Resolution<Self> {
        if self.is_plausible() {
            Resolution::Sourced(self)
        } else {
            Resolution::Absent
        }
    }
}

/// Estimate the previous session from its close.
pub fn estimate_prev_day(prev_close: f64) -> Resolution<PrevDayOhlc> {
    if !(prev_close > 0.0) {
        return Resolution::Absent;
    }
    Resolution::Estimated(PrevDayOhlc {
        open: prev_close * PREV_OPEN_RATIO,
        high: prev_close * PREV_HIGH_RATIO,
        low: prev_close * PREV_LOW_RATIO,
        close: prev_close,
    })
}

/// Previous-day high used for the gap test.
///
/// Returns the value and whether it was substituted from previous close.
pub fn effective_prev_day_high(record: &QuoteRecord) -> Option<(f64, bool)> {
    if record.prev_day_high > 0.0 {
        Some((record.prev_day_high, false))
    } else if record.prev_close > 0.0 {
        Some((record.prev_close * PREV_HIGH_RATIO, true))
    } else {
        None
    }
}

// ============================================================================
// Open Interest
// ============================================================================

/// Near-month futures open interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenInterest {
    pub total: u64,
    pub change: i64,
}

impl OpenInterest {
    /// Wrap a provider value, treating zero open interest as missing.
    pub fn sourced(self) -> Resolution<Self> {
        if self.total > 0 {
            Resolution::Sourced(self)
        } else {
            Resolution::Absent
        }
    }
}

// ============================================================================
// Record Application
// ============================================================================

impl QuoteRecord {
    /// Write a previous-session resolution into the record.
    ///
    /// Estimated values also tag the record as `{source}:prev_est`.
    pub fn apply_prev_day(&mut self, resolution: Resolution<PrevDayOhlc>) {
        self.prev_day_provenance = resolution.provenance();
        match resolution {
            Resolution::Sourced(ohlc) | Resolution::Estimated(ohlc) => {
                self.prev_day_open = ohlc.open;
                self.prev_day_high = ohlc.high;
                self.prev_day_low = ohlc.low;
                if self.prev_close <= 0.0 {
                    self.prev_close = ohlc.close;
                }
            }
            Resolution::Absent => {
                self.prev_day_open = 0.0;
                self.prev_day_high = 0.0;
                self.prev_day_low = 0.0;
            }
        }

        if self.prev_day_provenance == Provenance::Estimated {
            let base = self
                .source_tags()
                .next()
                .and_then(|t| t.split(':').next())
                .unwrap_or("unknown")
                .to_string();
            self.add_source_tag(&format!("{}{}", base, ESTIMATE_TAG_SUFFIX));
        }
    }

    /// Write an open interest resolution into the record.
    pub fn apply_open_interest(&mut self, resolution: Resolution<OpenInterest>) {
        if let Some(oi) = resolution.value() {
            self.total_oi = oi.total;
            self.change_in_oi = oi.change;
        }
    }
}
