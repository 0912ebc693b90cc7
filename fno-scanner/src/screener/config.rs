//! Screener configuration module.
//!
//! Gate thresholds for the gap-up screen, derived from the `strategy`
//! section of the shared config.

use fno_common::config::{Bounds, StrategyConfig};
use serde::{Deserialize, Serialize};

/// Gate thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum `(ltp - prev_close) / prev_close` in percent
    pub min_percentage_increase: f64,
    /// Volume must be strictly above this
    pub min_volume: u64,
    /// Inclusive LTP sanity band
    pub price_bounds: Bounds,
    /// Inclusive gap-up percentage band
    pub gap_bounds: Bounds,
    /// Inclusive percentage-change band
    pub change_bounds: Bounds,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::from(&StrategyConfig::default())
    }
}

impl From<&StrategyConfig> for FilterConfig {
    fn from(strategy: &StrategyConfig) -> Self {
        Self {
            min_percentage_increase: strategy.min_percentage_increase,
            min_volume: strategy.min_volume,
            price_bounds: strategy.price_bounds,
            gap_bounds: strategy.gap_bounds,
            change_bounds: strategy.change_bounds,
        }
    }
}

impl FilterConfig {
    /// Override the momentum threshold.
    pub fn with_min_percentage_increase(mut self, min: f64) -> Self {
        self.min_percentage_increase = min;
        self
    }
}
