//! Fyers brokerage API adapter.
//!
//! # API Overview
//! - Base URL: `https://api-t1.fyers.in/api/v3`
//! - Authentication: `Authorization: {app_id}:{access_token}`
//! - Quotes: up to 50 symbols per call as `NSE:{SYM}-EQ`
//! - History: daily candles `[epoch, open, high, low, close, volume]`
//!
//! Open interest comes from a quote on the current-month futures contract
//! (`NSE:{SYM}{YY}{MON}FUT`). Without credentials the source reports itself as
//! unconfigured and the orchestrator skips it.

use async_trait::async_trait;
use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use fno_common::config::Config;
use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use super::nse::lenient_f64;
use super::pacing::RequestPacer;
use super::provider::{QuoteSource, SourceCapabilities, SourceError};
use super::resolve::{estimate_prev_day, OpenInterest, PrevDayOhlc, Resolution};
use super::{market_date, market_today, QuoteRecord};

const SOURCE_NAME: &str = "fyers";
const DEFAULT_BASE_URL: &str = "https://api-t1.fyers.in/api/v3";

/// Maximum symbols per quotes request.
const QUOTE_BATCH_LIMIT: usize = 50;

/// Calendar days of daily candles requested for the previous session.
const HISTORY_LOOKBACK_DAYS: u64 = 7;

// ============================================================================
// Contract Naming
// ============================================================================

fn last_thursday_of_month(date: NaiveDate) -> Option<NaiveDate> {
    let last = date
        .with_day(1)?
        .checked_add_months(Months::new(1))?
        .pred_opt()?;
    let back = (last.weekday().num_days_from_monday() + 7
        - Weekday::Thu.num_days_from_monday())
        % 7;
    last.checked_sub_days(Days::new(u64::from(back)))
}

/// Expiry of the current-month futures contract as of `today`.
///
/// Monthly contracts expire on the last Thursday; after that day the next
/// month's contract is current.
pub fn fo_expiry(today: NaiveDate) -> Option<NaiveDate> {
    let this_month = last_thursday_of_month(today)?;
    if today <= this_month {
        Some(this_month)
    } else {
        last_thursday_of_month(today.with_day(1)?.checked_add_months(Months::new(1))?)
    }
}

/// Current-month futures ticker, e.g. `NSE:RELIANCE24JANFUT`.
pub fn futures_symbol(symbol: &str, today: NaiveDate) -> Option<String> {
    let expiry = fo_expiry(today)?;
    Some(format!(
        "NSE:{}{}FUT",
        symbol,
        expiry.format("%y%b").to_string().to_uppercase()
    ))
}

fn equity_symbol(symbol: &str) -> String {
    format!("NSE:{}-EQ", symbol)
}

fn plain_symbol(ticker: &str) -> &str {
    let ticker = ticker.strip_prefix("NSE:").unwrap_or(ticker);
    ticker.strip_suffix("-EQ").unwrap_or(ticker)
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct QuotesResponse {
    #[serde(default)]
    s: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    d: Vec<QuoteEntry>,
}

#[derive(Debug, Deserialize)]
struct QuoteEntry {
    #[serde(default)]
    n: String,
    #[serde(default)]
    s: String,
    v: Option<QuoteValues>,
}

#[derive(Debug, Deserialize)]
struct QuoteValues {
    #[serde(default, deserialize_with = "lenient_f64")]
    lp: Option<f64>,
    #[serde(default, alias = "o", deserialize_with = "lenient_f64")]
    open_price: Option<f64>,
    #[serde(default, alias = "h", deserialize_with = "lenient_f64")]
    high_price: Option<f64>,
    #[serde(default, alias = "l", deserialize_with = "lenient_f64")]
    low_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    prev_close_price: Option<f64>,
    #[serde(default, alias = "v", deserialize_with = "lenient_f64")]
    volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    oi: Option<f64>,
    #[serde(default, alias = "pdoi", deserialize_with = "lenient_f64")]
    prev_oi: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    s: String,
    #[serde(default)]
    candles: Vec<Vec<f64>>,
}

/// Latest daily candle dated before `today`.
fn previous_candle(candles: &[Vec<f64>], today: NaiveDate) -> Option<PrevDayOhlc> {
    candles
        .iter()
        .filter(|c| c.len() >= 5)
        .filter_map(|c| market_date(c[0] as i64).map(|d| (d, c)))
        .filter(|(d, _)| *d < today)
        .max_by_key(|(d, _)| *d)
        .map(|(_, c)| PrevDayOhlc {
            open: c[1],
            high: c[2],
            low: c[3],
            close: c[4],
        })
}

// ============================================================================
// Fyers Source
// ============================================================================

/// Brokerage API source.
pub struct FyersSource {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, String)>,
    priority: u8,
    pacer: RequestPacer,
}

impl FyersSource {
    pub fn new(
        base_url: impl Into<String>,
        credentials: Option<(String, String)>,
        priority: u8,
        timeout: Duration,
        pacer: RequestPacer,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: credentials.filter(|(id, token)| !id.is_empty() && !token.is_empty()),
            priority,
            pacer,
        }
    }

    /// Create from config. The source is returned even without credentials so
    /// that it can be reported as skipped.
    pub fn from_config(config: &Config) -> Option<Self> {
        let entry = config.source_entry(SOURCE_NAME)?;
        Some(Self::new(
            entry.option_str("base_url").unwrap_or(DEFAULT_BASE_URL),
            config.fyers_credentials(),
            entry.priority,
            Duration::from_secs(config.sources.request_timeout_secs),
            RequestPacer::from_config(&config.sources),
        ))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, SourceError> {
        let (app_id, token) = self
            .credentials
            .as_ref()
            .ok_or_else(|| SourceError::Auth("credentials not configured".into()))?;

        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("{}:{}", app_id, token))
            .query(query)
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SourceError::Malformed(format!("{}: {}", path, e)))
    }

    async fn quotes(&self, tickers: &[String]) -> Result<Vec<QuoteEntry>, SourceError> {
        let resp: QuotesResponse = self
            .get("/data/quotes", &[("symbols", tickers.join(","))])
            .await?;
        if resp.s != "ok" {
            return Err(SourceError::DataNotAvailable(
                resp.message.unwrap_or_else(|| format!("status '{}'", resp.s)),
            ));
        }
        Ok(resp.d)
    }

    async fn quote_chunk(&self, symbols: &[String]) -> Result<Vec<QuoteRecord>, SourceError> {
        let tickers: Vec<String> = symbols.iter().map(|s| equity_symbol(s)).collect();
        let entries = self.quotes(&tickers).await?;

        Ok(entries
            .into_iter()
            .filter(|e| e.s.is_empty() || e.s == "ok")
            .filter_map(|e| {
                let v = e.v?;
                let ltp = v.lp.unwrap_or(0.0);
                if ltp <= 0.0 {
                    return None;
                }
                let mut record = QuoteRecord::new(plain_symbol(&e.n), SOURCE_NAME);
                record.ltp = ltp;
                record.open_price = v.open_price.unwrap_or(0.0);
                record.high_price = v.high_price.unwrap_or(0.0);
                record.low_price = v.low_price.unwrap_or(0.0);
                record.prev_close = v.prev_close_price.unwrap_or(0.0);
                record.volume = v.volume.unwrap_or(0.0).max(0.0) as u64;
                Some(record)
            })
            .collect())
    }

    async fn previous_session(&self, symbol: &str) -> Resolution<PrevDayOhlc> {
        let today = market_today();
        let from = today
            .checked_sub_days(Days::new(HISTORY_LOOKBACK_DAYS))
            .unwrap_or(today);
        let query = [
            ("symbol", equity_symbol(symbol)),
            ("resolution", "D".to_string()),
            ("date_format", "1".to_string()),
            ("range_from", from.format("%Y-%m-%d").to_string()),
            ("range_to", today.format("%Y-%m-%d").to_string()),
            ("cont_flag", "1".to_string()),
        ];

        match self.get::<HistoryResponse>("/data/history", &query).await {
            Ok(resp) if resp.s == "ok" => previous_candle(&resp.candles, today)
                .map_or(Resolution::Absent, PrevDayOhlc::sourced),
            Ok(resp) => {
                debug!(source = SOURCE_NAME, symbol, status = %resp.s, "History not available");
                Resolution::Absent
            }
            Err(e) => {
                debug!(source = SOURCE_NAME, symbol, error = %e, "History lookup failed");
                Resolution::Absent
            }
        }
    }

    async fn open_interest(&self, symbol: &str) -> Resolution<OpenInterest> {
        let Some(contract) = futures_symbol(symbol, market_today()) else {
            return Resolution::Absent;
        };

        let values = match self.quotes(&[contract]).await {
            Ok(entries) => entries.into_iter().find_map(|e| e.v),
            Err(e) => {
                debug!(source = SOURCE_NAME, symbol, error = %e, "Futures quote failed");
                None
            }
        };
        let Some(v) = values else {
            return Resolution::Absent;
        };

        let oi = v.oi.unwrap_or(0.0).max(0.0);
        let prev_oi = v.prev_oi.unwrap_or(0.0);
        let change = if prev_oi > 0.0 { oi - prev_oi } else { 0.0 };
        OpenInterest {
            total: oi as u64,
            change: change as i64,
        }
        .sourced()
    }

    async fn enrich(&self, record: &mut QuoteRecord) {
        self.pacer.between_calls().await;
        let prev_close = record.prev_close;
        let prev = self
            .previous_session(&record.symbol)
            .await
            .or_else(|| estimate_prev_day(prev_close));
        record.apply_prev_day(prev);

        self.pacer.between_calls().await;
        record.apply_open_interest(self.open_interest(&record.symbol).await);
    }
}

#[async_trait]
impl QuoteSource for FyersSource {
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
            discovery: false,
            bulk_quotes: true,
        }
    }

    fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn pacer(&self) -> RequestPacer {
        self.pacer
    }

    async fn try_fetch_quote(&self, symbol: &str) -> Result<Option<QuoteRecord>, SourceError> {
        let mut records = self.quote_chunk(&[symbol.to_string()]).await?;
        let Some(mut record) = records.pop() else {
            return Ok(None);
        };
        self.enrich(&mut record).await;
        Ok(Some(record))
    }

    async fn fetch_quotes_batch(&self, symbols: &[String]) -> Vec<QuoteRecord> {
        if !self.is_configured() {
            return Vec::new();
        }

        let mut out = Vec::with_capacity(symbols.len());
        for chunk in symbols.chunks(QUOTE_BATCH_LIMIT) {
            match self.quote_chunk(chunk).await {
                Ok(mut records) => {
                    for record in records.iter_mut() {
                        self.enrich(record).await;
                    }
                    out.extend(records);
                }
                Err(e) => warn!(source = SOURCE_NAME, size = chunk.len(), error = %e, "Quote batch failed"),
            }
            self.pacer.between_calls().await;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Provenance;
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_expiry_within_month() {
        assert_eq!(fo_expiry(date(2024, 1, 15)), Some(date(2024, 1, 25)));
        assert_eq!(fo_expiry(date(2024, 1, 25)), Some(date(2024, 1, 25)));
    }

    #[test]
    fn test_expiry_rolls_after_last_thursday() {
        assert_eq!(fo_expiry(date(2024, 1, 26)), Some(date(2024, 2, 29)));
        assert_eq!(fo_expiry(date(2024, 12, 27)), Some(date(2025, 1, 30)));
    }

    #[test]
    fn test_futures_symbol() {
        assert_eq!(
            futures_symbol("RELIANCE", date(2024, 1, 15)).as_deref(),
            Some("NSE:RELIANCE24JANFUT")
        );
        assert_eq!(
            futures_symbol("TCS", date(2024, 12, 27)).as_deref(),
            Some("NSE:TCS25JANFUT")
        );
    }

    #[test]
    fn test_plain_symbol() {
        assert_eq!(plain_symbol("NSE:M&M-EQ"), "M&M");
        assert_eq!(plain_symbol("TCS"), "TCS");
    }

    fn source(server: &MockServer, creds: Option<(&str, &str)>) -> FyersSource {
        FyersSource::new(
            server.uri(),
            creds.map(|(a, t)| (a.to_string(), t.to_string())),
            3,
            Duration::from_secs(5),
            RequestPacer::immediate(),
        )
    }

    #[tokio::test]
    async fn test_unconfigured_is_skipped() {
        let server = MockServer::start().await;
        let src = source(&server, None);
        assert!(!src.is_configured());
        assert!(src.fetch_quotes_batch(&["TCS".to_string()]).await.is_empty());
        assert!(!source(&server, Some(("", "tok"))).is_configured());
    }

    #[tokio::test]
    async fn test_batch_with_history_and_open_interest() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/quotes"))
            .and(query_param("symbols", "NSE:TCS-EQ,NSE:INFY-EQ"))
            .and(header("Authorization", "APP-100:token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "d": [
                    {"n": "NSE:TCS-EQ", "s": "ok", "v": {
                        "lp": 3540.0, "open_price": 3500.0, "high_price": 3550.0,
                        "low_price": 3490.0, "prev_close_price": 3400.0, "volume": 150000}},
                    {"n": "NSE:INFY-EQ", "s": "error", "v": {"lp": 1.0}}
                ]
            })))
            .mount(&server)
            .await;

        let now = Utc::now().timestamp() as f64;
        Mock::given(method("GET"))
            .and(path("/data/history"))
            .and(query_param("symbol", "NSE:TCS-EQ"))
            .and(query_param("resolution", "D"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "candles": [
                    [946857600.0, 3300.0, 3390.0, 3280.0, 3350.0, 1000.0],
                    [946944000.0, 3350.0, 3420.0, 3340.0, 3400.0, 1000.0],
                    [now, 3500.0, 3550.0, 3490.0, 3540.0, 1000.0]
                ]
            })))
            .mount(&server)
            .await;

        let contract = futures_symbol("TCS", market_today()).unwrap();
        Mock::given(method("GET"))
            .and(path("/data/quotes"))
            .and(query_param("symbols", contract.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "d": [{"n": contract, "s": "ok", "v": {"lp": 3545.0, "oi": 12000, "prev_oi": 10000}}]
            })))
            .mount(&server)
            .await;

        let src = source(&server, Some(("APP-100", "token")));
        let records = src
            .fetch_quotes_batch(&["TCS".to_string(), "INFY".to_string()])
            .await;

        assert_eq!(records.len(), 1);
        let tcs = &records[0];
        assert_eq!(tcs.symbol, "TCS");
        assert_eq!(tcs.volume, 150000);
        assert_eq!(tcs.prev_day_high, 3420.0);
        assert_eq!(tcs.prev_day_provenance, Provenance::Sourced);
        assert_eq!(tcs.total_oi, 12000);
        assert_eq!(tcs.change_in_oi, 2000);
        assert_eq!(tcs.source, "fyers");
    }

    #[tokio::test]
    async fn test_single_candle_falls_back_to_estimate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/quotes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "d": [{"n": "NSE:ABC-EQ", "v": {"lp": 112.0, "o": 110.0, "prev_close_price": 100.0}}]
            })))
            .mount(&server)
            .await;
        let now = Utc::now().timestamp() as f64;
        Mock::given(method("GET"))
            .and(path("/data/history"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "s": "ok",
                "candles": [[now, 110.0, 113.0, 109.0, 112.0, 500.0]]
            })))
            .mount(&server)
            .await;

        let record = source(&server, Some(("APP", "tok")))
            .fetch_quote("ABC")
            .await
            .unwrap();
        assert_eq!(record.open_price, 110.0);
        assert_eq!(record.prev_day_provenance, Provenance::Estimated);
        assert_eq!(record.source, "fyers,fyers:prev_est");
    }

    #[tokio::test]
    async fn test_auth_failure_yields_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let src = source(&server, Some(("APP", "expired")));
        assert!(src.fetch_quote("ABC").await.is_none());
    }
}
