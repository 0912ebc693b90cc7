//! One scan cycle: discover the universe, acquire quotes, screen them.
//!
//! Cycles share nothing. Scheduling repeated cycles is left to the caller.

use chrono::{DateTime, Utc};
use fno_common::config::Config;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};
use uuid::Uuid;

use crate::data::{AcquisitionOrchestrator, CoverageStats, ScanError, SourceAttemptStats};
use crate::screener::{
    validate_results, FilterSummary, FilteredCandidate, GateStats, ResultValidation,
    ScreenerEngine, SignalDetector, TradeSignal,
};

/// Wall-clock time spent in each phase of a cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleTimings {
    pub discovery_ms: u64,
    pub acquisition_ms: u64,
    pub screening_ms: u64,
    pub total_ms: u64,
}

/// Everything one cycle produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub cycle_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub universe_size: usize,
    /// Highest percentage change first
    pub candidates: Vec<FilteredCandidate>,
    pub summary: FilterSummary,
    pub validation: ResultValidation,
    pub gate_stats: GateStats,
    pub signals: Vec<TradeSignal>,
    pub coverage: CoverageStats,
    pub sources: Vec<SourceAttemptStats>,
    pub skipped_sources: Vec<String>,
    pub timings: CycleTimings,
}

pub struct Scanner {
    orchestrator: AcquisitionOrchestrator,
    engine: ScreenerEngine,
    signals: SignalDetector,
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

impl Scanner {
    pub fn new(orchestrator: AcquisitionOrchestrator, engine: ScreenerEngine) -> Self {
        Self {
            orchestrator,
            engine,
            signals: SignalDetector::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            AcquisitionOrchestrator::from_config(config),
            ScreenerEngine::from_config(config),
        )
    }

    pub fn with_signal_detector(mut self, detector: SignalDetector) -> Self {
        self.signals = detector;
        self
    }

    pub fn orchestrator(&self) -> &AcquisitionOrchestrator {
        &self.orchestrator
    }

    pub fn engine(&self) -> &ScreenerEngine {
        &self.engine
    }

    /// Run one complete cycle.
    ///
    /// Fails only on contract violations (no configured source, empty
    /// universe). Partial coverage is reported, not raised.
    pub async fn run_cycle(&self) -> Result<ScanOutcome, ScanError> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let started = Instant::now();
        info!(cycle_id = %cycle_id, "Scan cycle started");

        let phase = Instant::now();
        let universe = self.orchestrator.discover_universe().await;
        let discovery_ms = elapsed_ms(phase);

        let phase = Instant::now();
        let report = match self.orchestrator.acquire(&universe).await {
            Ok(report) => report,
            Err(e) => {
                error!(cycle_id = %cycle_id, error = %e, "Scan cycle failed");
                return Err(e);
            }
        };
        let acquisition_ms = elapsed_ms(phase);

        let phase = Instant::now();
        let result = self.engine.screen(&report.records);
        let summary = result.summary();
        let validation = validate_results(&result.candidates, self.engine.config());
        let signals = self.signals.scan(&report.records);
        let screening_ms = elapsed_ms(phase);

        let timings = CycleTimings {
            discovery_ms,
            acquisition_ms,
            screening_ms,
            total_ms: elapsed_ms(started),
        };

        info!(
            cycle_id = %cycle_id,
            universe = universe.len(),
            resolved = report.coverage.resolved,
            coverage_pct = report.coverage.coverage_pct,
            candidates = result.candidates.len(),
            signals = signals.len(),
            total_ms = timings.total_ms,
            "Scan cycle completed"
        );

        Ok(ScanOutcome {
            cycle_id,
            started_at,
            universe_size: universe.len(),
            candidates: result.candidates,
            summary,
            validation,
            gate_stats: result.gate_stats,
            signals,
            coverage: report.coverage,
            sources: report.sources,
            skipped_sources: report.skipped_sources,
            timings,
        })
    }
}
