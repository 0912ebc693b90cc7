//! Open-interest breakout signals.
//!
//! A record signals BUY when it opens above the previous day's high and
//! open interest grew by more than the threshold, and SELL when it opens
//! below the previous day's low under the same open-interest condition.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::data::{Provenance, QuoteRecord};

/// Default minimum open-interest growth (%).
pub const DEFAULT_MIN_OI_CHANGE_PCT: f64 = 7.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub signal: Signal,
    pub open_price: f64,
    pub prev_day_high: f64,
    pub prev_day_low: f64,
    /// Open-interest change over prior open interest (%)
    pub oi_change_pct: f64,
    /// Whether the breakout level was sourced or estimated
    pub prev_day_provenance: Provenance,
}

/// Open-interest change as a percentage of the prior session's open interest.
///
/// Prior open interest is `total_oi - change_in_oi` and must be positive.
pub fn oi_change_pct(record: &QuoteRecord) -> Option<f64> {
    if record.total_oi == 0 {
        return None;
    }
    let prior = record.total_oi as i64 - record.change_in_oi;
    if prior <= 0 {
        return None;
    }
    Some(record.change_in_oi as f64 * 100.0 / prior as f64)
}

#[derive(Debug, Clone)]
pub struct SignalDetector {
    min_oi_change_pct: f64,
}

impl Default for SignalDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_OI_CHANGE_PCT)
    }
}

impl SignalDetector {
    pub fn new(min_oi_change_pct: f64) -> Self {
        Self { min_oi_change_pct }
    }

    pub fn detect(&self, record: &QuoteRecord) -> Option<TradeSignal> {
        if !(record.open_price > 0.0) {
            return None;
        }
        let change = oi_change_pct(record)?;
        if !(change > self.min_oi_change_pct) {
            return None;
        }

        let signal = if record.prev_day_high > 0.0 && record.open_price > record.prev_day_high {
            Signal::Buy
        } else if record.prev_day_low > 0.0 && record.open_price < record.prev_day_low {
            Signal::Sell
        } else {
            return None;
        };

        debug!(
            symbol = %record.symbol,
            signal = %signal,
            oi_change_pct = change,
            "Open-interest breakout"
        );
        Some(TradeSignal {
            symbol: record.symbol.clone(),
            signal,
            open_price: record.open_price,
            prev_day_high: record.prev_day_high,
            prev_day_low: record.prev_day_low,
            oi_change_pct: (change * 100.0).round() / 100.0,
            prev_day_provenance: record.prev_day_provenance,
        })
    }

    /// Signals for every record that qualifies, in input order.
    pub fn scan(&self, records: &[QuoteRecord]) -> Vec<TradeSignal> {
        let signals: Vec<_> = records.iter().filter_map(|r| self.detect(r)).collect();
        if !signals.is_empty() {
            let buys = signals.iter().filter(|s| s.signal == Signal::Buy).count();
            info!(
                buy = buys,
                sell = signals.len() - buys,
                "Open-interest signals detected"
            );
        }
        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn record(open: f64, total_oi: u64, change_in_oi: i64) -> QuoteRecord {
        QuoteRecord {
            symbol: "XYZ".into(),
            open_price: open,
            prev_day_high: 105.0,
            prev_day_low: 95.0,
            total_oi,
            change_in_oi,
            prev_day_provenance: Provenance::Sourced,
            ..Default::default()
        }
    }

    #[test_case(110.0, 1100, 100, Some(Signal::Buy); "breakout up")]
    #[test_case(90.0, 1100, 100, Some(Signal::Sell); "breakdown")]
    #[test_case(100.0, 1100, 100, None; "inside range")]
    #[test_case(110.0, 1070, 70, None; "oi growth exactly seven")]
    #[test_case(110.0, 1000, -100, None; "oi falling")]
    #[test_case(110.0, 0, 0, None; "no oi")]
    #[test_case(110.0, 100, 100, None; "no prior oi")]
    fn test_detect(open: f64, total_oi: u64, change: i64, expected: Option<Signal>) {
        let detected = SignalDetector::default().detect(&record(open, total_oi, change));
        assert_eq!(detected.map(|s| s.signal), expected);
    }

    #[test]
    fn test_oi_change_pct() {
        assert_eq!(oi_change_pct(&record(110.0, 1100, 100)), Some(10.0));
        assert_eq!(oi_change_pct(&record(110.0, 0, 0)), None);
    }

    #[test]
    fn test_missing_low_never_sells() {
        let mut r = record(90.0, 1100, 100);
        r.prev_day_low = 0.0;
        assert!(SignalDetector::default().detect(&r).is_none());
    }

    #[test]
    fn test_scan_keeps_order() {
        let mut sell = record(90.0, 1100, 100);
        sell.symbol = "SELLME".into();
        let signals = SignalDetector::default().scan(&[record(110.0, 1100, 100), sell, record(100.0, 1100, 100)]);
        assert_eq!(signals.len(), 2);
        assert_eq!(signals[0].signal, Signal::Buy);
        assert_eq!(signals[1].symbol, "SELLME");
        assert_eq!(serde_json::to_value(&signals[1].signal).unwrap(), "SELL");
    }
}
