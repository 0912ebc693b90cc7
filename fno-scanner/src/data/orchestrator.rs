//! Cascading acquisition across quote sources.
//!
//! Each scan cycle starts with every symbol PENDING. Sources are walked in
//! priority order; a tier only sees the symbols earlier tiers failed to
//! resolve. A symbol whose record passes the validator is RESOLVED and never
//! escalated further; symbols left after the last tier are EXHAUSTED.
//!
//! Within a tier, chunks are sent to the source one after another with a
//! randomized pause in between. Each chunk runs on its own task under a
//! timeout, so a panicking or hung source degrades to zero results for that
//! chunk instead of stalling the cycle.

use fno_common::config::{Config, DataSourcesConfig};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::fyers::FyersSource;
use super::merge::{consolidate, merge};
use super::nse::NseApiSource;
use super::provider::{QuoteSource, SourceInfo};
use super::toolkit::NseToolkitSource;
use super::universe::{is_delisted, known_fo_universe};
use super::validator::QuoteValidator;
use super::yahoo::YahooChartSource;
use super::{is_valid_symbol, QuoteRecord};

/// Upper bound on network calls a source makes per symbol.
const CALLS_PER_SYMBOL: u32 = 3;

// ============================================================================
// Errors
// ============================================================================

/// Contract violations that make a cycle meaningless.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("no quote sources are configured")]
    NoSourcesConfigured,

    #[error("symbol universe is empty")]
    EmptyUniverse,
}

// ============================================================================
// Configuration
// ============================================================================

/// Tunables for one acquisition cycle.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Symbols per chunk
    pub batch_size: usize,
    /// Concurrent sources during discovery and the completion pass
    pub max_workers: usize,
    /// Upper bound on one chunk attempt
    pub chunk_timeout: Duration,
    /// Offer resolved symbols without open interest to later sources
    pub complete_open_interest: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_sources(&DataSourcesConfig::default())
    }
}

impl OrchestratorConfig {
    pub fn from_sources(sources: &DataSourcesConfig) -> Self {
        let batch_size = sources.effective_batch_size();
        let per_call = Duration::from_secs(sources.request_timeout_secs.max(1));
        Self {
            batch_size,
            max_workers: sources.max_workers.max(1),
            chunk_timeout: per_call * CALLS_PER_SYMBOL * batch_size as u32,
            complete_open_interest: sources.complete_open_interest,
        }
    }
}

// ============================================================================
// Report Types
// ============================================================================

/// Per-symbol position in the cascade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SymbolState {
    Pending,
    Attempted { source: String },
    Resolved { source: String },
    Exhausted,
}

/// Resolved vs. total symbols for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageStats {
    pub total: usize,
    pub resolved: usize,
    pub exhausted: usize,
    pub coverage_pct: f64,
}

impl CoverageStats {
    pub fn new(total: usize, resolved: usize) -> Self {
        let coverage_pct = if total == 0 {
            0.0
        } else {
            resolved as f64 / total as f64 * 100.0
        };
        Self {
            total,
            resolved,
            exhausted: total.saturating_sub(resolved),
            coverage_pct,
        }
    }
}

/// What one source contributed to a cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceAttemptStats {
    pub source: String,
    /// Symbols sent to the source
    pub attempted: usize,
    /// Records the source returned
    pub returned: usize,
    /// Records that passed the validator
    pub validated: usize,
    /// Records the validator rejected
    pub rejected: usize,
    /// Chunks lost to a timeout or panic
    pub failed_chunks: usize,
    /// Open interest filled in for symbols resolved by earlier sources
    pub oi_completed: usize,
    pub duration_ms: u64,
}

impl SourceAttemptStats {
    fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            ..Default::default()
        }
    }
}

/// Output of one acquisition cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcquisitionReport {
    /// One consolidated record per resolved symbol
    pub records: Vec<QuoteRecord>,
    pub coverage: CoverageStats,
    pub sources: Vec<SourceAttemptStats>,
    /// Registered sources skipped as unconfigured
    pub skipped_sources: Vec<String>,
    pub symbol_states: BTreeMap<String, SymbolState>,
    pub duration_ms: u64,
}

impl AcquisitionReport {
    pub fn stats_for(&self, source: &str) -> Option<&SourceAttemptStats> {
        self.sources.iter().find(|s| s.source == source)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Drives the source cascade for one scan cycle at a time.
pub struct AcquisitionOrchestrator {
    sources: Vec<Arc<dyn QuoteSource>>,
    validator: QuoteValidator,
    config: OrchestratorConfig,
}

impl AcquisitionOrchestrator {
    pub fn new(config: OrchestratorConfig, validator: QuoteValidator) -> Self {
        Self {
            sources: Vec::new(),
            validator,
            config,
        }
    }

    /// Build the cascade from the `sources` config list.
    pub fn from_config(config: &Config) -> Self {
        let mut orchestrator = Self::new(
            OrchestratorConfig::from_sources(&config.sources),
            QuoteValidator::from_config(config),
        );

        for entry in config.sources.sources.iter().filter(|e| e.enabled) {
            let source: Option<Arc<dyn QuoteSource>> = match entry.provider.as_str() {
                "nse_api" => NseApiSource::from_config(config).map(|s| Arc::new(s) as _),
                "nse_toolkit" => NseToolkitSource::from_config(config).map(|s| Arc::new(s) as _),
                "fyers" => FyersSource::from_config(config).map(|s| Arc::new(s) as _),
                "yfinance" => YahooChartSource::from_config(config).map(|s| Arc::new(s) as _),
                other => {
                    warn!(provider = other, "Unknown quote source");
                    None
                }
            };
            if let Some(source) = source {
                orchestrator.register(source);
            }
        }

        orchestrator
    }

    /// Add a source, keeping the cascade ordered by priority.
    pub fn register(&mut self, source: Arc<dyn QuoteSource>) {
        info!(
            source = source.name(),
            priority = source.priority(),
            configured = source.is_configured(),
            "Registered quote source"
        );
        self.sources.push(source);
        self.sources.sort_by_key(|s| s.priority());
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn sources_info(&self) -> Vec<SourceInfo> {
        self.sources.iter().map(|s| s.info()).collect()
    }

    fn configured_sources(&self) -> Vec<Arc<dyn QuoteSource>> {
        self.sources
            .iter()
            .filter(|s| s.is_configured())
            .cloned()
            .collect()
    }

    /// Union of every discovery-capable source's universe.
    ///
    /// Delisted tickers are dropped. Falls back to the static F&O list when
    /// discovery yields nothing.
    pub async fn discover_universe(&self) -> HashSet<String> {
        let discoverers: Vec<_> = self
            .configured_sources()
            .into_iter()
            .filter(|s| s.capabilities().discovery)
            .collect();

        let found: Vec<(&'static str, HashSet<String>)> = stream::iter(discoverers)
            .map(|source| async move { (source.name(), source.discover_universe().await) })
            .buffer_unordered(self.config.max_workers)
            .collect()
            .await;

        let mut universe = HashSet::new();
        for (name, symbols) in found {
            debug!(source = name, count = symbols.len(), "Discovery result");
            universe.extend(
                symbols
                    .into_iter()
                    .filter(|s| is_valid_symbol(s) && !is_delisted(s)),
            );
        }

        if universe.is_empty() {
            warn!("Universe discovery failed on every source, using known F&O list");
            return known_fo_universe();
        }

        info!(count = universe.len(), "Discovered symbol universe");
        universe
    }

    /// Run the cascade over `universe`.
    pub async fn acquire(&self, universe: &HashSet<String>) -> Result<AcquisitionReport, ScanError> {
        let started = Instant::now();

        let sources = self.configured_sources();
        let skipped_sources: Vec<String> = self
            .sources
            .iter()
            .filter(|s| !s.is_configured())
            .map(|s| s.name().to_string())
            .collect();
        for name in &skipped_sources {
            info!(source = %name, "Skipping unconfigured source");
        }

        if sources.is_empty() {
            error!("Acquisition requested with no configured quote sources");
            return Err(ScanError::NoSourcesConfigured);
        }
        if universe.is_empty() {
            error!("Acquisition requested for an empty universe");
            return Err(ScanError::EmptyUniverse);
        }

        let ordered: BTreeSet<&String> = universe.iter().collect();
        let mut pending: Vec<String> = ordered.into_iter().cloned().collect();
        let mut states: BTreeMap<String, SymbolState> = pending
            .iter()
            .map(|s| (s.clone(), SymbolState::Pending))
            .collect();
        let mut resolved: Vec<QuoteRecord> = Vec::new();
        let mut all_stats: Vec<SourceAttemptStats> = Vec::new();

        for source in &sources {
            if pending.is_empty() {
                break;
            }

            let tier_started = Instant::now();
            let mut stats = SourceAttemptStats::new(source.name());
            for symbol in &pending {
                states.insert(
                    symbol.clone(),
                    SymbolState::Attempted {
                        source: source.name().to_string(),
                    },
                );
            }

            let raw = self.attempt_source(source, &pending, &mut stats).await;
            let wanted: HashSet<&str> = pending.iter().map(String::as_str).collect();
            let valid = self.validate_records(raw, &wanted, &mut stats);

            let mut newly_resolved: HashSet<String> = HashSet::new();
            for record in consolidate(valid) {
                states.insert(
                    record.symbol.clone(),
                    SymbolState::Resolved {
                        source: source.name().to_string(),
                    },
                );
                newly_resolved.insert(record.symbol.clone());
                resolved.push(record);
            }
            pending.retain(|s| !newly_resolved.contains(s));

            stats.duration_ms = tier_started.elapsed().as_millis() as u64;
            info!(
                source = source.name(),
                attempted = stats.attempted,
                validated = stats.validated,
                rejected = stats.rejected,
                failed_chunks = stats.failed_chunks,
                remaining = pending.len(),
                "Source tier finished"
            );
            all_stats.push(stats);
        }

        for symbol in &pending {
            states.insert(symbol.clone(), SymbolState::Exhausted);
        }

        if self.config.complete_open_interest {
            self.complete_open_interest(&sources, &states, &mut resolved, &mut all_stats)
                .await;
        }

        let coverage = CoverageStats::new(universe.len(), resolved.len());
        info!(
            total = coverage.total,
            resolved = coverage.resolved,
            exhausted = coverage.exhausted,
            coverage_pct = coverage.coverage_pct,
            "Acquisition finished"
        );

        Ok(AcquisitionReport {
            records: resolved,
            coverage,
            sources: all_stats,
            skipped_sources,
            symbol_states: states,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Send `symbols` to one source chunk by chunk.
    async fn attempt_source(
        &self,
        source: &Arc<dyn QuoteSource>,
        symbols: &[String],
        stats: &mut SourceAttemptStats,
    ) -> Vec<QuoteRecord> {
        let pacer = source.pacer();
        let mut out = Vec::new();

        for (i, chunk) in symbols.chunks(self.config.batch_size.max(1)).enumerate() {
            if i > 0 {
                pacer.between_batches().await;
            }
            stats.attempted += chunk.len();
            match self.run_chunk(Arc::clone(source), chunk.to_vec()).await {
                Some(records) => {
                    stats.returned += records.len();
                    out.extend(records);
                }
                None => stats.failed_chunks += 1,
            }
        }

        out
    }

    /// One isolated chunk attempt. `None` on panic or timeout.
    async fn run_chunk(&self, source: Arc<dyn QuoteSource>, chunk: Vec<String>) -> Option<Vec<QuoteRecord>> {
        let name = source.name();
        let size = chunk.len();
        let mut handle = tokio::spawn(async move { source.fetch_quotes_batch(&chunk).await });

        match tokio::time::timeout(self.config.chunk_timeout, &mut handle).await {
            Ok(Ok(records)) => Some(records),
            Ok(Err(e)) => {
                warn!(source = name, size, error = %e, "Chunk attempt aborted");
                None
            }
            Err(_) => {
                handle.abort();
                warn!(
                    source = name,
                    size,
                    timeout_ms = self.config.chunk_timeout.as_millis() as u64,
                    "Chunk attempt timed out"
                );
                None
            }
        }
    }

    fn validate_records(
        &self,
        raw: Vec<QuoteRecord>,
        wanted: &HashSet<&str>,
        stats: &mut SourceAttemptStats,
    ) -> Vec<QuoteRecord> {
        let mut valid = Vec::with_capacity(raw.len());
        for record in raw {
            if !wanted.contains(record.symbol.as_str()) {
                debug!(source = %stats.source, symbol = %record.symbol, "Ignoring unrequested symbol");
                continue;
            }
            if self.validator.validate(&record) {
                stats.validated += 1;
                valid.push(record);
            } else {
                stats.rejected += 1;
            }
        }
        valid
    }

    /// Offer resolved symbols lacking open interest to the next
    /// open-interest-capable source after the one that resolved them.
    ///
    /// Different sources run concurrently; each source's own calls stay
    /// sequential.
    async fn complete_open_interest(
        &self,
        sources: &[Arc<dyn QuoteSource>],
        states: &BTreeMap<String, SymbolState>,
        resolved: &mut [QuoteRecord],
        stats: &mut Vec<SourceAttemptStats>,
    ) {
        let tier_of = |name: &str| sources.iter().position(|s| s.name() == name);

        let mut jobs: HashMap<usize, Vec<String>> = HashMap::new();
        for record in resolved.iter().filter(|r| r.total_oi == 0) {
            let Some(SymbolState::Resolved { source }) = states.get(&record.symbol) else {
                continue;
            };
            let Some(tier) = tier_of(source) else {
                continue;
            };
            let next = sources
                .iter()
                .enumerate()
                .skip(tier + 1)
                .find(|(_, s)| s.capabilities().open_interest);
            if let Some((idx, _)) = next {
                jobs.entry(idx).or_default().push(record.symbol.clone());
            }
        }

        if jobs.is_empty() {
            return;
        }

        let this = self;
        let results: Vec<(usize, SourceAttemptStats, Vec<QuoteRecord>)> = stream::iter(jobs)
            .map(|(idx, symbols)| {
                let source = Arc::clone(&sources[idx]);
                async move {
                    let mut job_stats = SourceAttemptStats::new(source.name());
                    let raw = this.attempt_source(&source, &symbols, &mut job_stats).await;
                    let wanted: HashSet<&str> = symbols.iter().map(String::as_str).collect();
                    let valid = this.validate_records(raw, &wanted, &mut job_stats);
                    (idx, job_stats, valid)
                }
            })
            .buffer_unordered(self.config.max_workers)
            .collect()
            .await;

        let index: HashMap<String, usize> = resolved
            .iter()
            .enumerate()
            .map(|(i, r)| (r.symbol.clone(), i))
            .collect();

        for (idx, job_stats, records) in results {
            let name = sources[idx].name();
            let mut completed = 0;
            for incoming in records.into_iter().filter(|r| r.total_oi > 0) {
                if let Some(&i) = index.get(&incoming.symbol) {
                    resolved[i] = merge(&resolved[i], &incoming);
                    completed += 1;
                }
            }

            info!(source = name, attempted = job_stats.attempted, completed, "Open interest completion");

            match stats.iter_mut().find(|s| s.source == name) {
                Some(existing) => {
                    existing.attempted += job_stats.attempted;
                    existing.returned += job_stats.returned;
                    existing.validated += job_stats.validated;
                    existing.rejected += job_stats.rejected;
                    existing.failed_chunks += job_stats.failed_chunks;
                    existing.oi_completed += completed;
                }
                None => stats.push(SourceAttemptStats {
                    oi_completed: completed,
                    ..job_stats
                }),
            }
        }
    }
}
