//! Integration tests for the acquisition cascade.
//!
//! Exercises tier escalation, validation, open-interest completion and
//! failure isolation with in-memory sources.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use common::{quote, symbols, test_config, universe, MockSource, PanickingSource};
use fno_scanner::data::{
    AcquisitionOrchestrator, OrchestratorConfig, QuoteValidator, ScanError, SymbolState,
};

fn orchestrator(config: OrchestratorConfig) -> AcquisitionOrchestrator {
    AcquisitionOrchestrator::new(config, QuoteValidator::default())
}

// ============================================================================
// Cascade
// ============================================================================

#[tokio::test]
async fn test_cascade_reaches_full_coverage_without_duplicates() {
    let all = symbols("SYM", 10);
    let (first_seven, last_three) = all.split_at(7);

    let empty = Arc::new(MockSource::new("empty", 1));
    let second = Arc::new(MockSource::new("second", 2).serving(first_seven));
    let third = Arc::new(MockSource::new("third", 3).serving(&all));

    let mut orch = orchestrator(test_config());
    orch.register(third.clone());
    orch.register(empty.clone());
    orch.register(second.clone());

    let report = orch.acquire(&universe(&all)).await.unwrap();

    assert_eq!(report.coverage.total, 10);
    assert_eq!(report.coverage.resolved, 10);
    assert!((report.coverage.coverage_pct - 100.0).abs() < 1e-9);
    assert_eq!(report.records.len(), 10);

    let unique: HashSet<_> = report.records.iter().map(|r| r.symbol.clone()).collect();
    assert_eq!(unique.len(), 10);

    // Later tiers only see what earlier tiers missed.
    assert_eq!(empty.calls(), 10);
    assert_eq!(second.calls(), 10);
    let third_requested: HashSet<_> = third.requested().into_iter().collect();
    assert_eq!(third_requested, universe(last_three));

    assert_eq!(report.stats_for("second").unwrap().validated, 7);
    assert_eq!(report.stats_for("third").unwrap().validated, 3);
    assert_eq!(
        report.symbol_states["SYM9"],
        SymbolState::Resolved {
            source: "third".into()
        }
    );
}

#[tokio::test]
async fn test_partial_coverage_is_reported() {
    let all = symbols("P", 4);
    let source = Arc::new(MockSource::new("only", 1).serving(&all[..1]));

    let mut orch = orchestrator(test_config());
    orch.register(source);

    let report = orch.acquire(&universe(&all)).await.unwrap();
    assert_eq!(report.coverage.resolved, 1);
    assert_eq!(report.coverage.exhausted, 3);
    assert_eq!(report.symbol_states["P3"], SymbolState::Exhausted);
}

#[tokio::test]
async fn test_unconfigured_source_is_skipped() {
    let locked = Arc::new(MockSource::new("locked", 1).serving(&["ABC"]).unconfigured());
    let open = Arc::new(MockSource::new("open", 2).serving(&["ABC"]));

    let mut orch = orchestrator(test_config());
    orch.register(locked.clone());
    orch.register(open);

    let report = orch.acquire(&universe(&["ABC"])).await.unwrap();
    assert_eq!(report.skipped_sources, vec!["locked".to_string()]);
    assert_eq!(locked.calls(), 0);
    assert_eq!(report.records[0].source, "open");
}

#[tokio::test]
async fn test_only_unconfigured_sources_is_an_error() {
    let mut orch = orchestrator(test_config());
    orch.register(Arc::new(MockSource::new("locked", 1).unconfigured()));

    let err = orch.acquire(&universe(&["ABC"])).await.unwrap_err();
    assert_eq!(err, ScanError::NoSourcesConfigured);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_synthetic_record_escalates_to_next_tier() {
    let fake = Arc::new(MockSource::new("filler", 1).with_record(quote("XYZ", "synthetic_fill")));
    let real = Arc::new(MockSource::new("real", 2).serving(&["XYZ"]));

    let mut orch = orchestrator(test_config());
    orch.register(fake);
    orch.register(real);

    let report = orch.acquire(&universe(&["XYZ"])).await.unwrap();
    assert_eq!(report.stats_for("filler").unwrap().rejected, 1);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.records[0].source, "real");
}

#[tokio::test]
async fn test_implausible_change_is_rejected() {
    let mut wild = quote("XYZ", "wild");
    wild.ltp = 151.0;

    let mut orch = orchestrator(test_config());
    orch.register(Arc::new(MockSource::new("wild", 1).with_record(wild)));

    let report = orch.acquire(&universe(&["XYZ"])).await.unwrap();
    assert!(report.records.is_empty());
    assert_eq!(report.stats_for("wild").unwrap().rejected, 1);
}

// ============================================================================
// Open Interest Completion
// ============================================================================

#[tokio::test]
async fn test_open_interest_completed_by_later_source() {
    let mut with_oi = quote("XYZ", "toolkitB");
    with_oi.total_oi = 5000;
    with_oi.change_in_oi = 400;

    let scrape = Arc::new(MockSource::new("scrapeA", 1).serving(&["XYZ"]));
    let toolkit = Arc::new(
        MockSource::new("toolkitB", 2)
            .with_record(with_oi)
            .with_open_interest(),
    );

    let mut orch = orchestrator(test_config());
    orch.register(scrape);
    orch.register(toolkit.clone());

    let report = orch.acquire(&universe(&["XYZ"])).await.unwrap();
    assert_eq!(report.records.len(), 1);

    let record = &report.records[0];
    assert_eq!(record.total_oi, 5000);
    assert_eq!(record.change_in_oi, 400);
    assert_eq!(record.source, "scrapeA,toolkitB");
    assert_eq!(toolkit.calls(), 1);
    assert_eq!(report.stats_for("toolkitB").unwrap().oi_completed, 1);
    assert_eq!(
        report.symbol_states["XYZ"],
        SymbolState::Resolved {
            source: "scrapeA".into()
        }
    );
}

#[tokio::test]
async fn test_completion_skips_sources_without_open_interest() {
    let scrape = Arc::new(MockSource::new("scrapeA", 1).serving(&["XYZ"]));
    let plain = Arc::new(MockSource::new("plain", 2).serving(&["XYZ"]));

    let mut orch = orchestrator(test_config());
    orch.register(scrape);
    orch.register(plain.clone());

    let report = orch.acquire(&universe(&["XYZ"])).await.unwrap();
    assert_eq!(plain.calls(), 0);
    assert_eq!(report.records[0].total_oi, 0);
}

#[tokio::test]
async fn test_completion_can_be_disabled() {
    let scrape = Arc::new(MockSource::new("scrapeA", 1).serving(&["XYZ"]));
    let toolkit = Arc::new(
        MockSource::new("toolkitB", 2)
            .serving(&["XYZ"])
            .with_open_interest(),
    );

    let mut orch = orchestrator(OrchestratorConfig {
        complete_open_interest: false,
        ..test_config()
    });
    orch.register(scrape);
    orch.register(toolkit.clone());

    orch.acquire(&universe(&["XYZ"])).await.unwrap();
    assert_eq!(toolkit.calls(), 0);
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[tokio::test]
async fn test_hung_source_times_out_and_cascade_continues() {
    let slow = Arc::new(
        MockSource::new("slow", 1)
            .serving(&["ABC"])
            .with_delay(Duration::from_secs(3600)),
    );
    let backup = Arc::new(MockSource::new("backup", 2).serving(&["ABC"]));

    let mut orch = orchestrator(OrchestratorConfig {
        chunk_timeout: Duration::from_millis(50),
        ..test_config()
    });
    orch.register(slow);
    orch.register(backup);

    let report = orch.acquire(&universe(&["ABC"])).await.unwrap();
    assert_eq!(report.stats_for("slow").unwrap().failed_chunks, 1);
    assert_eq!(report.records[0].source, "backup");
}

#[tokio::test]
async fn test_panicking_source_does_not_abort_cycle() {
    let backup = Arc::new(MockSource::new("backup", 2).serving(&["ABC", "DEF"]));

    let mut orch = orchestrator(test_config());
    orch.register(Arc::new(PanickingSource { priority: 1 }));
    orch.register(backup);

    let report = orch.acquire(&universe(&["ABC", "DEF"])).await.unwrap();
    assert_eq!(report.stats_for("panicking").unwrap().failed_chunks, 1);
    assert_eq!(report.coverage.resolved, 2);
}

#[tokio::test]
async fn test_chunks_respect_batch_size() {
    let all = symbols("C", 45);
    let source = Arc::new(MockSource::new("chunked", 1).serving(&all));

    let mut orch = orchestrator(test_config());
    orch.register(source.clone());

    let report = orch.acquire(&universe(&all)).await.unwrap();
    let stats = report.stats_for("chunked").unwrap();
    assert_eq!(stats.attempted, 45);
    assert_eq!(stats.failed_chunks, 0);
    assert_eq!(source.calls(), 45);
    assert_eq!(report.coverage.resolved, 45);
}

// ============================================================================
// Discovery
// ============================================================================

#[tokio::test]
async fn test_discovery_unions_and_drops_delisted() {
    let a = Arc::new(MockSource::new("a", 1).discovering(&["RELIANCE", "PVR", "TCS"]));
    let b = Arc::new(MockSource::new("b", 2).discovering(&["TCS", "INFY", "bad symbol"]));

    let mut orch = orchestrator(test_config());
    orch.register(a);
    orch.register(b);

    let found = orch.discover_universe().await;
    assert_eq!(found, universe(&["RELIANCE", "TCS", "INFY"]));
}
