//! Scraped exchange website adapter (nseindia.com JSON API).
//!
//! # Endpoints
//! - `/api/equity-stockIndices?index=SECURITIES%20IN%20F%26O` - F&O universe
//! - `/api/quote-equity?symbol=` - live quote
//! - `/api/historical/cm/equity?symbol=` - daily history (previous session)
//! - `/api/quote-derivative?symbol=` - futures open interest
//!
//! # Features
//! - Richest field set of all sources (previous-day OHLC, open interest)
//! - Requires a browser-like session, see [`SessionManager`]
//! - Least reliable availability; first in the cascade

use async_trait::async_trait;
use chrono::NaiveDate;
use fno_common::config::Config;
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use super::pacing::RequestPacer;
use super::provider::{QuoteSource, SourceCapabilities, SourceError};
use super::resolve::{estimate_prev_day, OpenInterest, PrevDayOhlc, Resolution};
use super::session::{SessionManager, NSE_BASE_URL};
use super::universe::is_delisted;
use super::{is_valid_symbol, market_today, QuoteRecord};

// ============================================================================
// Constants
// ============================================================================

const SOURCE_NAME: &str = "nse_api";

const QUOTE_PATH: &str = "/api/quote-equity";
const HISTORICAL_PATH: &str = "/api/historical/cm/equity";
const DERIVATIVE_PATH: &str = "/api/quote-derivative";

/// Index listings that enumerate the F&O universe, in preference order.
pub(super) const FO_INDEX_PATHS: &[&str] = &[
    "/api/equity-stockIndices?index=SECURITIES%20IN%20F%26O",
    "/api/equity-stockIndices?index=NIFTY%20F%26O",
];

const STOCK_FUTURES: &str = "Stock Futures";

// ============================================================================
// Lenient Number Parsing
// ============================================================================

/// Accept numbers, numeric strings ("1,234.50") and placeholders ("-", null).
pub(super) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().replace(',', "").parse().ok(),
        _ => None,
    })
}

/// URL-encode a ticker for a query string (`M&M` -> `M%26M`).
pub(super) fn encode_symbol(symbol: &str) -> String {
    url::form_urlencoded::byte_serialize(symbol.as_bytes()).collect()
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEquityResponse {
    price_info: Option<PriceInfo>,
    #[serde(default)]
    market_dept_order_book: Option<OrderBook>,
    #[serde(default)]
    pre_open_market: Option<PreOpenMarket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceInfo {
    #[serde(default, deserialize_with = "lenient_f64")]
    last_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    open: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    previous_close: Option<f64>,
    #[serde(default)]
    intra_day_high_low: Option<HighLow>,
}

#[derive(Debug, Deserialize)]
struct HighLow {
    #[serde(default, deserialize_with = "lenient_f64")]
    min: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    max: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderBook {
    #[serde(default, deserialize_with = "lenient_f64")]
    total_traded_volume: Option<f64>,
    #[serde(default)]
    trade_info: Option<TradeInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradeInfo {
    #[serde(default, deserialize_with = "lenient_f64")]
    total_traded_volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    open_interest: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    changein_open_interest: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreOpenMarket {
    #[serde(default, deserialize_with = "lenient_f64")]
    total_traded_volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    #[serde(default)]
    data: Vec<HistoricalRow>,
}

#[derive(Debug, Deserialize)]
pub(super) struct HistoricalRow {
    #[serde(rename = "CH_TIMESTAMP", default)]
    timestamp: Option<String>,
    #[serde(rename = "CH_OPENING_PRICE", default, deserialize_with = "lenient_f64")]
    open: Option<f64>,
    #[serde(rename = "CH_TRADE_HIGH_PRICE", default, deserialize_with = "lenient_f64")]
    high: Option<f64>,
    #[serde(rename = "CH_TRADE_LOW_PRICE", default, deserialize_with = "lenient_f64")]
    low: Option<f64>,
    #[serde(rename = "CH_CLOSING_PRICE", default, deserialize_with = "lenient_f64")]
    close: Option<f64>,
}

impl HistoricalRow {
    fn date(&self) -> Option<NaiveDate> {
        let ts = self.timestamp.as_deref()?;
        NaiveDate::parse_from_str(ts.get(..10)?, "%Y-%m-%d").ok()
    }

    fn ohlc(&self) -> PrevDayOhlc {
        PrevDayOhlc {
            open: self.open.unwrap_or(0.0),
            high: self.high.unwrap_or(0.0),
            low: self.low.unwrap_or(0.0),
            close: self.close.unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DerivativeResponse {
    #[serde(default)]
    stocks: Vec<DerivativeStock>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DerivativeStock {
    metadata: DerivativeMetadata,
    #[serde(default)]
    market_dept_order_book: Option<OrderBook>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DerivativeMetadata {
    #[serde(default)]
    instrument_type: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    open_interest: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    changein_open_interest: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub(super) struct IndexResponse {
    #[serde(default)]
    pub data: Vec<IndexRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct IndexRow {
    #[serde(default)]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub open: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub day_high: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub day_low: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub last_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub previous_close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub total_traded_volume: Option<f64>,
}

/// Keep only tradeable, non-delisted tickers from an index listing.
pub(super) fn universe_from_index(rows: &[IndexRow]) -> HashSet<String> {
    rows.iter()
        .map(|r| r.symbol.trim().to_uppercase())
        .filter(|s| is_valid_symbol(s) && !is_delisted(s))
        .collect()
}

/// Pick the latest session strictly before `today`.
///
/// Rows without a parseable date fall back to positional order
/// (newest first, today's row possibly at the head).
pub(super) fn select_previous_session(rows: &[HistoricalRow], today: NaiveDate) -> Option<PrevDayOhlc> {
    let dated = rows
        .iter()
        .filter_map(|r| r.date().map(|d| (d, r)))
        .filter(|(d, _)| *d < today)
        .max_by_key(|(d, _)| *d);

    match dated {
        Some((_, row)) => Some(row.ohlc()),
        None if rows.iter().all(|r| r.date().is_none()) => rows.get(1).map(HistoricalRow::ohlc),
        None => None,
    }
}

// ============================================================================
// NSE API Source
// ============================================================================

/// Scraped exchange website source.
pub struct NseApiSource {
    session: SessionManager,
    priority: u8,
    pacer: RequestPacer,
}

impl NseApiSource {
    /// Create against the public exchange website.
    pub fn new(priority: u8) -> Self {
        Self::with_base_url(
            NSE_BASE_URL,
            priority,
            Duration::from_secs(15),
            Duration::from_secs(300),
            RequestPacer::default(),
        )
    }

    /// Create against an arbitrary base URL (used by tests and mirrors).
    pub fn with_base_url(
        base_url: &str,
        priority: u8,
        timeout: Duration,
        session_refresh: Duration,
        pacer: RequestPacer,
    ) -> Self {
        Self {
            session: SessionManager::new(base_url, timeout, session_refresh).with_settle(pacer),
            priority,
            pacer,
        }
    }

    /// Create from config; `None` when the entry is missing or disabled.
    pub fn from_config(config: &Config) -> Option<Self> {
        let entry = config.source_entry(SOURCE_NAME)?;
        let base_url = entry.option_str("base_url").unwrap_or(NSE_BASE_URL);
        Some(Self::with_base_url(
            base_url,
            entry.priority,
            Duration::from_secs(config.sources.request_timeout_secs),
            Duration::from_secs(config.sources.session_refresh_secs),
            RequestPacer::from_config(&config.sources),
        ))
    }

    async fn previous_session(&self, symbol: &str) -> Resolution<PrevDayOhlc> {
        let path = format!("{}?symbol={}", HISTORICAL_PATH, encode_symbol(symbol));
        match self.session.get_json::<HistoricalResponse>(&path).await {
            Ok(resp) => select_previous_session(&resp.data, market_today())
                .map_or(Resolution::Absent, PrevDayOhlc::sourced),
            Err(e) => {
                debug!(source = SOURCE_NAME, symbol, error = %e, "Historical lookup failed");
                Resolution::Absent
            }
        }
    }

    async fn open_interest(&self, symbol: &str) -> Resolution<OpenInterest> {
        let path = format!("{}?symbol={}", DERIVATIVE_PATH, encode_symbol(symbol));
        let resp = match self.session.get_json::<DerivativeResponse>(&path).await {
            Ok(resp) => resp,
            Err(e) => {
                debug!(source = SOURCE_NAME, symbol, error = %e, "Derivative lookup failed");
                return Resolution::Absent;
            }
        };

        let Some(future) = resp
            .stocks
            .iter()
            .find(|s| s.metadata.instrument_type == STOCK_FUTURES)
        else {
            return Resolution::Absent;
        };

        let trade_info = future
            .market_dept_order_book
            .as_ref()
            .and_then(|b| b.trade_info.as_ref());
        let total = future
            .metadata
            .open_interest
            .or_else(|| trade_info.and_then(|t| t.open_interest))
            .unwrap_or(0.0);
        let change = future
            .metadata
            .changein_open_interest
            .or_else(|| trade_info.and_then(|t| t.changein_open_interest))
            .unwrap_or(0.0);

        OpenInterest {
            total: total.max(0.0) as u64,
            change: change as i64,
        }
        .sourced()
    }
}

#[async_trait]
impl QuoteSource for NseApiSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            open_interest: true,
            prev_day_history: true,
            discovery: true,
            bulk_quotes: false,
        }
    }

    fn pacer(&self) -> RequestPacer {
        self.pacer
    }

    async fn try_discover(&self) -> Result<HashSet<String>, SourceError> {
        if !self.session.ensure_session().await {
            return Err(SourceError::SessionUnavailable);
        }

        let mut last_error = SourceError::DataNotAvailable("no F&O index answered".into());
        for path in FO_INDEX_PATHS {
            match self.session.get_json::<IndexResponse>(path).await {
                Ok(resp) => {
                    let symbols = universe_from_index(&resp.data);
                    if !symbols.is_empty() {
                        info!(source = SOURCE_NAME, count = symbols.len(), "Discovered F&O universe");
                        return Ok(symbols);
                    }
                }
                Err(e) => last_error = e,
            }
            self.pacer.between_calls().await;
        }

        Err(last_error)
    }

    async fn try_fetch_quote(&self, symbol: &str) -> Result<Option<QuoteRecord>, SourceError> {
        if !self.session.ensure_session().await {
            return Err(SourceError::SessionUnavailable);
        }

        let path = format!("{}?symbol={}", QUOTE_PATH, encode_symbol(symbol));
        let quote: QuoteEquityResponse = self.session.get_json(&path).await?;

        let Some(price) = quote.price_info else {
            return Err(SourceError::DataNotAvailable(format!("no priceInfo for {}", symbol)));
        };
        let ltp = price.last_price.unwrap_or(0.0);
        if ltp <= 0.0 {
            return Ok(None);
        }

        let volume = quote
            .market_dept_order_book
            .as_ref()
            .and_then(|b| {
                b.trade_info
                    .as_ref()
                    .and_then(|t| t.total_traded_volume)
                    .or(b.total_traded_volume)
            })
            .or_else(|| quote.pre_open_market.as_ref().and_then(|p| p.total_traded_volume))
            .unwrap_or(0.0);

        let mut record = QuoteRecord::new(symbol, SOURCE_NAME);
        record.ltp = ltp;
        record.open_price = price.open.unwrap_or(0.0);
        record.prev_close = price.previous_close.unwrap_or(0.0);
        if let Some(hl) = price.intra_day_high_low {
            record.high_price = hl.max.unwrap_or(0.0);
            record.low_price = hl.min.unwrap_or(0.0);
        }
        record.volume = volume.max(0.0) as u64;

        self.pacer.between_calls().await;
        let prev_close = record.prev_close;
        let prev = self
            .previous_session(symbol)
            .await
            .or_else(|| estimate_prev_day(prev_close));
        record.apply_prev_day(prev);

        self.pacer.between_calls().await;
        record.apply_open_interest(self.open_interest(symbol).await);

        Ok(Some(record))
    }
}
