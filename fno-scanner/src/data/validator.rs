//! Plausibility gate for raw quote records.
//!
//! Every record is checked here before the orchestrator trusts it,
//! regardless of which source produced it. Upstream outages tend to surface
//! as zero-filled, stale or placeholder rows; none of them may reach the
//! screener.

use fno_common::config::{Config, ValidationConfig};
use std::fmt;
use tracing::debug;

use super::{is_valid_symbol, QuoteRecord};

// ============================================================================
// Rejection Reasons
// ============================================================================

/// Why a record failed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Source tag marks the row as fabricated
    SyntheticSource(String),
    /// No provenance tag
    EmptySource,
    /// Symbol empty or outside `[A-Za-z0-9&-]`
    InvalidSymbol(String),
    /// A numeric field is NaN or infinite
    NonFinite(&'static str),
    /// Required price missing or not positive
    MissingPrice(&'static str),
    /// Present price below zero
    NegativePrice(&'static str),
    /// Present price outside the absolute plausibility band
    PriceOutOfBand { field: &'static str, value: f64 },
    /// Day-over-day move too large to be real
    ExcessiveChange { ratio: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SyntheticSource(src) => write!(f, "synthetic source tag '{}'", src),
            Self::EmptySource => write!(f, "empty source tag"),
            Self::InvalidSymbol(s) => write!(f, "invalid symbol '{}'", s),
            Self::NonFinite(field) => write!(f, "{} is not a finite number", field),
            Self::MissingPrice(field) => write!(f, "{} missing or not positive", field),
            Self::NegativePrice(field) => write!(f, "{} is negative", field),
            Self::PriceOutOfBand { field, value } => {
                write!(f, "{} = {} outside plausibility band", field, value)
            }
            Self::ExcessiveChange { ratio } => {
                write!(f, "day change ratio {:.4} exceeds limit", ratio)
            }
        }
    }
}

// ============================================================================
// Quote Validator
// ============================================================================

/// Field-level plausibility gate.
#[derive(Debug, Clone)]
pub struct QuoteValidator {
    config: ValidationConfig,
}

impl Default for QuoteValidator {
    fn default() -> Self {
        Self::new(ValidationConfig::default())
    }
}

impl QuoteValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.validation.clone())
    }

    /// Check a record, returning the first failed rule.
    pub fn check(&self, record: &QuoteRecord) -> Result<(), Rejection> {
        let source = record.source.to_lowercase();
        if let Some(marker) = self
            .config
            .synthetic_markers
            .iter()
            .find(|m| !m.is_empty() && source.contains(&m.to_lowercase()))
        {
            return Err(Rejection::SyntheticSource(marker.clone()));
        }
        if record.source_tags().next().is_none() {
            return Err(Rejection::EmptySource);
        }

        if !is_valid_symbol(&record.symbol) {
            return Err(Rejection::InvalidSymbol(record.symbol.clone()));
        }

        let prices = [
            ("open_price", record.open_price),
            ("high_price", record.high_price),
            ("low_price", record.low_price),
            ("ltp", record.ltp),
            ("prev_close", record.prev_close),
            ("prev_day_open", record.prev_day_open),
            ("prev_day_high", record.prev_day_high),
            ("prev_day_low", record.prev_day_low),
        ];

        for (field, value) in prices {
            if !value.is_finite() {
                return Err(Rejection::NonFinite(field));
            }
            if value < 0.0 {
                return Err(Rejection::NegativePrice(field));
            }
        }

        if record.ltp <= 0.0 {
            return Err(Rejection::MissingPrice("ltp"));
        }
        if record.prev_close <= 0.0 {
            return Err(Rejection::MissingPrice("prev_close"));
        }
        if self.config.require_open_price && record.open_price <= 0.0 {
            return Err(Rejection::MissingPrice("open_price"));
        }

        // Zero is the placeholder for "not supplied"; only present values are banded.
        for (field, value) in prices {
            if value > 0.0 && !self.config.price_bounds.contains(value) {
                return Err(Rejection::PriceOutOfBand { field, value });
            }
        }

        let ratio = (record.ltp / record.prev_close - 1.0).abs();
        if ratio > self.config.max_day_change_ratio {
            return Err(Rejection::ExcessiveChange { ratio });
        }

        Ok(())
    }

    /// Check a record, logging the rejection reason at debug level.
    pub fn validate(&self, record: &QuoteRecord) -> bool {
        match self.check(record) {
            Ok(()) => true,
            Err(reason) => {
                debug!(
                    symbol = %record.symbol,
                    source = %record.source,
                    reason = %reason,
                    "Record rejected"
                );
                false
            }
        }
    }
}

/// Validate with the default gate configuration.
pub fn validate(record: &QuoteRecord) -> bool {
    QuoteValidator::default().validate(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn plausible() -> QuoteRecord {
        QuoteRecord {
            symbol: "ABC".into(),
            open_price: 110.0,
            high_price: 113.0,
            low_price: 109.0,
            ltp: 112.0,
            prev_close: 100.0,
            prev_day_open: 99.0,
            prev_day_high: 105.0,
            prev_day_low: 98.0,
            volume: 5000,
            total_oi: 0,
            change_in_oi: 0,
            source: "nse_api".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_plausible_record_passes() {
        assert!(validate(&plausible()));
    }

    #[test_case("synthetic_fill"; "synthetic")]
    #[test_case("nse_api,Generated"; "generated mixed case")]
    #[test_case("fake-feed"; "fake")]
    fn test_synthetic_source_rejected(source: &str) {
        let mut r = plausible();
        r.source = source.into();
        assert!(matches!(
            QuoteValidator::default().check(&r),
            Err(Rejection::SyntheticSource(_))
        ));
    }

    #[test]
    fn test_synthetic_rejected_before_other_rules() {
        let mut r = plausible();
        r.source = "synthetic".into();
        r.ltp = -1.0;
        assert!(matches!(
            QuoteValidator::default().check(&r),
            Err(Rejection::SyntheticSource(_))
        ));
    }

    #[test_case(0.0, 100.0; "zero ltp")]
    #[test_case(-5.0, 100.0; "negative ltp")]
    #[test_case(100.0, 0.0; "zero prev close")]
    #[test_case(100.0, -1.0; "negative prev close")]
    #[test_case(151.0, 100.0; "up more than half")]
    #[test_case(49.0, 100.0; "down more than half")]
    fn test_invalid_prices(ltp: f64, prev_close: f64) {
        let mut r = plausible();
        r.ltp = ltp;
        r.prev_close = prev_close;
        r.open_price = 100.0;
        assert!(!validate(&r));
    }

    #[test]
    fn test_change_limit_is_inclusive() {
        let mut r = plausible();
        r.ltp = 150.0;
        r.prev_close = 100.0;
        assert!(validate(&r));
    }

    #[test]
    fn test_empty_source_rejected() {
        let mut r = plausible();
        r.source = " , ".into();
        assert_eq!(QuoteValidator::default().check(&r), Err(Rejection::EmptySource));
    }

    #[test]
    fn test_bad_symbol_rejected() {
        let mut r = plausible();
        r.symbol = "NIFTY 50".into();
        assert!(matches!(
            QuoteValidator::default().check(&r),
            Err(Rejection::InvalidSymbol(_))
        ));
    }

    #[test]
    fn test_missing_open_respects_config() {
        let mut r = plausible();
        r.open_price = 0.0;
        assert_eq!(
            QuoteValidator::default().check(&r),
            Err(Rejection::MissingPrice("open_price"))
        );

        let relaxed = QuoteValidator::new(ValidationConfig {
            require_open_price: false,
            ..Default::default()
        });
        assert!(relaxed.validate(&r));
    }

    #[test]
    fn test_price_band() {
        let mut r = plausible();
        r.ltp = 0.5;
        r.prev_close = 0.6;
        r.open_price = 0.55;
        r.prev_day_open = 0.0;
        r.prev_day_high = 0.0;
        r.prev_day_low = 0.0;
        r.high_price = 0.0;
        r.low_price = 0.0;
        assert!(matches!(
            QuoteValidator::default().check(&r),
            Err(Rejection::PriceOutOfBand { field: "open_price", .. })
        ));
    }

    #[test]
    fn test_nan_rejected() {
        let mut r = plausible();
        r.high_price = f64::NAN;
        assert_eq!(
            QuoteValidator::default().check(&r),
            Err(Rejection::NonFinite("high_price"))
        );
    }

    #[test]
    fn test_placeholder_prev_day_is_allowed() {
        let mut r = plausible();
        r.prev_day_open = 0.0;
        r.prev_day_high = 0.0;
        r.prev_day_low = 0.0;
        assert!(validate(&r));
    }
}
