//! Bulk exchange snapshot adapter.
//!
//! One index listing returns every F&O constituent's live quote, so a whole
//! batch costs a single request. The pre-open listing fills in symbols the
//! index omits. Neither endpoint carries open interest or previous-session
//! OHLC, so previous-day values are always estimated from previous close.

use async_trait::async_trait;
use fno_common::config::Config;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::nse::{lenient_f64, universe_from_index, IndexResponse, IndexRow, FO_INDEX_PATHS};
use super::pacing::RequestPacer;
use super::provider::{QuoteSource, SourceCapabilities, SourceError};
use super::resolve::estimate_prev_day;
use super::session::{SessionManager, NSE_BASE_URL};
use super::QuoteRecord;

const SOURCE_NAME: &str = "nse_toolkit";
const PRE_OPEN_PATH: &str = "/api/market-data-pre-open?key=FO";

/// How long one snapshot answers per-symbol lookups.
const SNAPSHOT_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct PreOpenResponse {
    #[serde(default)]
    data: Vec<PreOpenRow>,
}

#[derive(Debug, Deserialize)]
struct PreOpenRow {
    metadata: PreOpenMetadata,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreOpenMetadata {
    #[serde(default)]
    symbol: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    last_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    prev_close: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    iep: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    final_quantity: Option<f64>,
}

fn record_from_index(row: &IndexRow) -> Option<QuoteRecord> {
    let ltp = row.last_price.unwrap_or(0.0);
    if ltp <= 0.0 {
        return None;
    }
    let mut record = QuoteRecord::new(row.symbol.trim().to_uppercase(), SOURCE_NAME);
    record.ltp = ltp;
    record.open_price = row.open.unwrap_or(0.0);
    record.high_price = row.day_high.unwrap_or(0.0);
    record.low_price = row.day_low.unwrap_or(0.0);
    record.prev_close = row.previous_close.unwrap_or(0.0);
    record.volume = row.total_traded_volume.unwrap_or(0.0).max(0.0) as u64;
    Some(record)
}

fn record_from_pre_open(meta: &PreOpenMetadata) -> Option<QuoteRecord> {
    let ltp = meta.last_price.or(meta.iep).unwrap_or(0.0);
    if ltp <= 0.0 {
        return None;
    }
    let mut record = QuoteRecord::new(meta.symbol.trim().to_uppercase(), SOURCE_NAME);
    record.ltp = ltp;
    record.open_price = meta.iep.unwrap_or(0.0);
    record.prev_close = meta.prev_close.unwrap_or(0.0);
    record.volume = meta.final_quantity.unwrap_or(0.0).max(0.0) as u64;
    Some(record)
}

struct Snapshot {
    taken_at: Instant,
    records: HashMap<String, QuoteRecord>,
}

/// Bulk exchange snapshot source.
pub struct NseToolkitSource {
    session: SessionManager,
    priority: u8,
    pacer: RequestPacer,
    snapshot: Mutex<Option<Snapshot>>,
}

impl NseToolkitSource {
    pub fn new(priority: u8) -> Self {
        Self::with_base_url(NSE_BASE_URL, priority, Duration::from_secs(15), RequestPacer::default())
    }

    pub fn with_base_url(base_url: &str, priority: u8, timeout: Duration, pacer: RequestPacer) -> Self {
        Self {
            session: SessionManager::new(base_url, timeout, Duration::from_secs(300)).with_settle(pacer),
            priority,
            pacer,
            snapshot: Mutex::new(None),
        }
    }

    pub fn from_config(config: &Config) -> Option<Self> {
        let entry = config.source_entry(SOURCE_NAME)?;
        let base_url = entry.option_str("base_url").unwrap_or(NSE_BASE_URL);
        Some(Self::with_base_url(
            base_url,
            entry.priority,
            Duration::from_secs(config.sources.request_timeout_secs),
            RequestPacer::from_config(&config.sources),
        ))
    }

    async fn index_rows(&self) -> Result<Vec<IndexRow>, SourceError> {
        let mut last_error = SourceError::DataNotAvailable("no F&O index answered".into());
        for path in FO_INDEX_PATHS {
            match self.session.get_json::<IndexResponse>(path).await {
                Ok(resp) if !resp.data.is_empty() => return Ok(resp.data),
                Ok(_) => {}
                Err(e) => last_error = e,
            }
            self.pacer.between_calls().await;
        }
        Err(last_error)
    }

    /// Fetch the index listing and pre-open board into one symbol map.
    async fn take_snapshot(&self) -> Result<HashMap<String, QuoteRecord>, SourceError> {
        if !self.session.ensure_session().await {
            return Err(SourceError::SessionUnavailable);
        }

        let mut records: HashMap<String, QuoteRecord> = HashMap::new();
        let index_result = self.index_rows().await;
        if let Ok(rows) = &index_result {
            for record in rows.iter().filter_map(record_from_index) {
                records.insert(record.symbol.clone(), record);
            }
        }

        self.pacer.between_calls().await;
        match self.session.get_json::<PreOpenResponse>(PRE_OPEN_PATH).await {
            Ok(resp) => {
                for record in resp.data.iter().filter_map(|r| record_from_pre_open(&r.metadata)) {
                    records.entry(record.symbol.clone()).or_insert(record);
                }
            }
            Err(e) => debug!(source = SOURCE_NAME, error = %e, "Pre-open board unavailable"),
        }

        if records.is_empty() {
            return Err(index_result
                .err()
                .unwrap_or_else(|| SourceError::DataNotAvailable("empty snapshot".into())));
        }

        for record in records.values_mut() {
            let prev_close = record.prev_close;
            record.apply_prev_day(estimate_prev_day(prev_close));
        }

        info!(source = SOURCE_NAME, count = records.len(), "Snapshot taken");
        Ok(records)
    }

    async fn snapshot_lookup(&self, symbols: &[String]) -> Result<Vec<QuoteRecord>, SourceError> {
        let mut guard = self.snapshot.lock().await;
        let fresh = guard
            .as_ref()
            .map(|s| s.taken_at.elapsed() < SNAPSHOT_TTL)
            .unwrap_or(false);
        if !fresh {
            let records = self.take_snapshot().await?;
            *guard = Some(Snapshot {
                taken_at: Instant::now(),
                records,
            });
        }

        let records = guard.as_ref().map(|s| &s.records);
        Ok(symbols
            .iter()
            .filter_map(|sym| records.and_then(|r| r.get(sym)).cloned())
            .collect())
    }
}

#[async_trait]
impl QuoteSource for NseToolkitSource {
    fn name(&self) -> &'static str {
        SOURCE_NAME
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities {
            open_interest: false,
            prev_day_history: false,
            discovery: true,
            bulk_quotes: true,
        }
    }

    fn pacer(&self) -> RequestPacer {
        self.pacer
    }

    async fn try_discover(&self) -> Result<HashSet<String>, SourceError> {
        if !self.session.ensure_session().await {
            return Err(SourceError::SessionUnavailable);
        }
        let rows = self.index_rows().await?;
        Ok(universe_from_index(&rows))
    }

    async fn try_fetch_quote(&self, symbol: &str) -> Result<Option<QuoteRecord>, SourceError> {
        let found = self.snapshot_lookup(&[symbol.to_string()]).await?;
        Ok(found.into_iter().next())
    }

    async fn fetch_quotes_batch(&self, symbols: &[String]) -> Vec<QuoteRecord> {
        match self.snapshot_lookup(symbols).await {
            Ok(records) => {
                debug!(
                    source = SOURCE_NAME,
                    requested = symbols.len(),
                    found = records.len(),
                    "Batch served from snapshot"
                );
                records
            }
            Err(e) => {
                warn!(source = SOURCE_NAME, error = %e, "Snapshot failed");
                Vec::new()
            }
        }
    }
}
