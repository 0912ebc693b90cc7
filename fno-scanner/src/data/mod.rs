//! Market data acquisition for NSE F&O equities.
//!
//! Collects near-real-time quotes from several partially-overlapping
//! providers, gates every raw record through the validator, and consolidates
//! the survivors into one record per symbol.
//!
//! # Data Sources (cascade order)
//! - **nse_api**: scraped exchange website, richest fields, least available
//! - **nse_toolkit**: bulk exchange snapshots, no open interest
//! - **fyers**: brokerage API, only when credentials are configured
//! - **yfinance**: chart API fallback, always available

mod fyers;
mod merge;
mod nse;
mod orchestrator;
mod pacing;
mod provider;
mod resolve;
mod session;
mod toolkit;
mod universe;
mod validator;
mod yahoo;

pub use fyers::{fo_expiry, futures_symbol, FyersSource};
pub use merge::{consolidate, merge};
pub use nse::NseApiSource;
pub use orchestrator::{
    AcquisitionOrchestrator, AcquisitionReport, CoverageStats, OrchestratorConfig, ScanError,
    SourceAttemptStats, SymbolState,
};
pub use pacing::RequestPacer;
pub use provider::{QuoteSource, SourceCapabilities, SourceError, SourceInfo};
pub use resolve::{
    estimate_prev_day, effective_prev_day_high, OpenInterest, PrevDayOhlc, Resolution,
    ESTIMATE_TAG_SUFFIX, PREV_HIGH_RATIO, PREV_LOW_RATIO, PREV_OPEN_RATIO,
};
pub use session::{BrowserSignature, SessionManager, SessionStrategy, NSE_BASE_URL};
pub use toolkit::NseToolkitSource;
pub use universe::{is_delisted, known_fo_universe, DELISTED_SYMBOLS};
pub use validator::{validate, QuoteValidator, Rejection};
pub use yahoo::YahooChartSource;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Core Data Types
// ============================================================================

/// Provenance of a record's previous-session OHLC values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// No value was resolved; fields hold the zero placeholder
    #[default]
    Absent,
    /// Derived from previous close by a fixed ratio
    Estimated,
    /// Read from a historical endpoint
    Sourced,
}

/// Best-effort quote snapshot for one instrument.
///
/// Zero is the placeholder for any price or count a source could not supply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    /// Last traded price
    pub ltp: f64,
    pub prev_close: f64,
    pub prev_day_open: f64,
    pub prev_day_high: f64,
    pub prev_day_low: f64,
    pub volume: u64,
    /// Open interest of the near-month future
    pub total_oi: u64,
    pub change_in_oi: i64,
    /// Comma-joined provenance tags
    pub source: String,
    #[serde(default)]
    pub prev_day_provenance: Provenance,
}

impl QuoteRecord {
    /// Create an empty record for `symbol` tagged with `source`.
    pub fn new(symbol: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            source: source.into(),
            ..Default::default()
        }
    }

    /// Individual provenance tags, in insertion order.
    pub fn source_tags(&self) -> impl Iterator<Item = &str> {
        self.source
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Append a provenance tag unless it is already present.
    pub fn add_source_tag(&mut self, tag: &str) {
        let tag = tag.trim();
        if tag.is_empty() || self.source_tags().any(|t| t == tag) {
            return;
        }
        if self.source.trim().is_empty() {
            self.source = tag.to_string();
        } else {
            self.source = format!("{},{}", self.source, tag);
        }
    }

    /// Percentage move of `ltp` over `prev_close`.
    pub fn percentage_change(&self) -> Option<f64> {
        if self.prev_close > 0.0 {
            Some((self.ltp - self.prev_close) / self.prev_close * 100.0)
        } else {
            None
        }
    }
}

/// Check that a ticker is non-empty and alphanumeric plus `&` and `-`.
pub fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '&' || c == '-')
}

/// IST offset in seconds (UTC+05:30).
const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// Current trading date on the exchange calendar (IST).
pub fn market_today() -> NaiveDate {
    match FixedOffset::east_opt(IST_OFFSET_SECS) {
        Some(ist) => Utc::now().with_timezone(&ist).date_naive(),
        None => Utc::now().date_naive(),
    }
}

/// Exchange calendar date of a unix timestamp.
pub(crate) fn market_date(epoch_secs: i64) -> Option<NaiveDate> {
    let utc = DateTime::from_timestamp(epoch_secs, 0)?;
    let ist = FixedOffset::east_opt(IST_OFFSET_SECS)?;
    Some(utc.with_timezone(&ist).date_naive())
}
