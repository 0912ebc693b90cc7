//! Yahoo Finance chart API adapter.
//!
//! Last-resort source: always available, no credentials, no open interest.
//! A five-day daily chart supplies today's bar (last candle) and the previous
//! session (the candle before it).

use async_trait::async_trait;
use fno_common::config::Config;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use serde::Deserialize;
use std::time::Duration;

use super::nse::encode_symbol;
use super::pacing::RequestPacer;
use super::provider::{QuoteSource, SourceCapabilities, SourceError};
use super::resolve::{estimate_prev_day, PrevDayOhlc, Resolution};
use super::QuoteRecord;

const SOURCE_NAME: &str = "yfinance";
const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const EXCHANGE_SUFFIX: &str = ".NS";
const CHART_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartResult {
    #[serde(default)]
    meta: ChartMeta,
    #[serde(default)]
    indicators: Indicators,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    chart_previous_close: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<CandleSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct CandleSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl CandleSeries {
    fn at(series: &[Option<f64>], i: usize) -> f64 {
        series.get(i).copied().flatten().unwrap_or(0.0)
    }

    /// Indices of bars that carry a close, oldest first.
    fn complete_bars(&self) -> Vec<usize> {
        (0..self.close.len())
            .filter(|&i| Self::at(&self.close, i) > 0.0)
            .collect()
    }

    fn ohlc(&self, i: usize) -> PrevDayOhlc {
        PrevDayOhlc {
            open: Self::at(&self.open, i),
            high: Self::at(&self.high, i),
            low: Self::at(&self.low, i),
            close: Self::at(&self.close, i),
        }
    }
}

fn record_from_chart(symbol: &str, result: &ChartResult) -> Option<QuoteRecord> {
    let series = result.indicators.quote.first()?;
    let bars = series.complete_bars();
    let (&today, earlier) = bars.split_last()?;

    let mut record = QuoteRecord::new(symbol, SOURCE_NAME);
    let bar = series.ohlc(today);
    record.open_price = bar.open;
    record.high_price = bar.high;
    record.low_price = bar.low;
    record.ltp = result.meta.regular_market_price.unwrap_or(bar.close);
    record.volume = CandleSeries::at(&series.volume, today).max(0.0) as u64;
    if record.ltp <= 0.0 {
        return None;
    }

    let prev = match earlier.last() {
        Some(&i) => {
            let ohlc = series.ohlc(i);
            record.prev_close = ohlc.close;
            ohlc.sourced()
        }
        None => {
            record.prev_close = result.meta.chart_previous_close.unwrap_or(0.0);
            Resolution::Absent
        }
    };
    let prev_close = record.prev_close;
    record.apply_prev_day(prev.or_else(|| estimate_prev_day(prev_close)));
    Some(record)
}

/// Chart API fallback source.
pub struct YahooChartSource {
    client: reqwest::Client,
    base_url: String,
    priority: u8,
    pacer: RequestPacer,
}

impl YahooChartSource {
    pub fn new(base_url: impl Into<String>, priority: u8, timeout: Duration, pacer: RequestPacer) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(CHART_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            priority,
            pacer,
        }
    }

    pub fn from_config(config: &Config) -> Option<Self> {
        let entry = config.source_entry(SOURCE_NAME)?;
        Some(Self::new(
            entry.option_str("base_url").unwrap_or(DEFAULT_BASE_URL),
            entry.priority,
            Duration::from_secs(config.sources.request_timeout_secs),
            RequestPacer::from_config(&config.sources),
        ))
    }
}

#[async_trait]
impl QuoteSource for YahooChartSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            open_interest: false,
            prev_day_history: true,
            discovery: false,
            bulk_quotes: false,
        }
    }

    fn pacer(&self) -> RequestPacer {
        self.pacer
    }

    async fn try_fetch_quote(&self, symbol: &str) -> Result<Option<QuoteRecord>, SourceError> {
        let url = format!(
            "{}/v8/finance/chart/{}{}",
            self.base_url,
            encode_symbol(symbol),
            EXCHANGE_SUFFIX
        );

        let response = self
            .client
            .get(&url)
            .query(&[("range", "5d"), ("interval", "1d")])
            .send()
            .await
            .map_err(SourceError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::from_status(status));
        }

        let body: ChartResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(e.to_string()))?;

        if let Some(err) = body.chart.error {
            return Err(SourceError::DataNotAvailable(format!(
                "{}: {}",
                err.code, err.description
            )));
        }

        Ok(body
            .chart
            .result
            .as_deref()
            .and_then(|r| r.first())
            .and_then(|r| record_from_chart(symbol, r)))
    }
}
