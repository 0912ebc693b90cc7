//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use fno_scanner::data::{
    OrchestratorConfig, Provenance, QuoteRecord, QuoteSource, SourceCapabilities, SourceError,
};

/// Plausible quote that passes the validator and the default gate.
pub fn quote(symbol: &str, source: &str) -> QuoteRecord {
    QuoteRecord {
        symbol: symbol.into(),
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
        source: source.into(),
        prev_day_provenance: Provenance::Sourced,
    }
}

pub fn symbols(prefix: &str, n: usize) -> Vec<String> {
    (0..n).map(|i| format!("{}{}", prefix, i)).collect()
}

pub fn universe<S: AsRef<str>>(symbols: &[S]) -> HashSet<String> {
    symbols.iter().map(|s| s.as_ref().to_string()).collect()
}

/// Fast cascade settings for tests.
pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        batch_size: 20,
        max_workers: 3,
        chunk_timeout: Duration::from_secs(5),
        complete_open_interest: true,
    }
}

// ============================================================================
// Mock Source
// ============================================================================

/// Scriptable in-memory quote source.
pub struct MockSource {
    name: &'static str,
    priority: u8,
    capabilities: SourceCapabilities,
    configured: bool,
    delay: Option<Duration>,
    records: HashMap<String, QuoteRecord>,
    universe: HashSet<String>,
    calls: AtomicUsize,
    requested: Mutex<Vec<String>>,
}

impl MockSource {
    pub fn new(name: &'static str, priority: u8) -> Self {
        Self {
            name,
            priority,
            capabilities: SourceCapabilities::default(),
            configured: true,
            delay: None,
            records: HashMap::new(),
            universe: HashSet::new(),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    /// Serve a plausible quote tagged with this source for each symbol.
    pub fn serving<S: AsRef<str>>(mut self, symbols: &[S]) -> Self {
        for s in symbols {
            let record = quote(s.as_ref(), self.name);
            self.records.insert(record.symbol.clone(), record);
        }
        self
    }

    pub fn with_record(mut self, record: QuoteRecord) -> Self {
        self.records.insert(record.symbol.clone(), record);
        self
    }

    pub fn with_open_interest(mut self) -> Self {
        self.capabilities.open_interest = true;
        self
    }

    pub fn discovering<S: AsRef<str>>(mut self, symbols: &[S]) -> Self {
        self.capabilities.discovery = true;
        self.universe = universe(symbols);
        self
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuoteSource for MockSource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> SourceCapabilities {
        self.capabilities
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn try_discover(&self) -> Result<HashSet<String>, SourceError> {
        Ok(self.universe.clone())
    }

    async fn try_fetch_quote(&self, symbol: &str) -> Result<Option<QuoteRecord>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(symbol.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.records.get(symbol).cloned())
    }
}

/// Source whose parser panics on every symbol.
pub struct PanickingSource {
    pub priority: u8,
}

#[async_trait]
impl QuoteSource for PanickingSource {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn priority(&self) -> u8 {
        self.priority
    }

    fn capabilities(&self) -> SourceCapabilities {
        SourceCapabilities::default()
    }

    async fn try_fetch_quote(&self, symbol: &str) -> Result<Option<QuoteRecord>, SourceError> {
        panic!("unexpected payload for {}", symbol);
    }
}
