//! End-to-end screening tests: validator, merger, gate, scoring and the
//! full scan cycle over in-memory sources.

mod common;

use std::sync::Arc;

use common::{quote, test_config, MockSource};
use fno_scanner::data::{
    merge, validate, AcquisitionOrchestrator, QuoteRecord, QuoteValidator, ScanError,
};
use fno_scanner::screener::{
    validate_results, DataQuality, FilterConfig, GateCriterion, GapUpGate, ScreenerEngine, Signal,
};
use fno_scanner::Scanner;
use tokio_test::{assert_err, assert_ok};

fn scenario_one() -> QuoteRecord {
    QuoteRecord {
        symbol: "ABC".into(),
        open_price: 110.0,
        ltp: 112.0,
        prev_close: 100.0,
        prev_day_high: 105.0,
        volume: 5000,
        total_oi: 0,
        source: "nse_api".into(),
        ..Default::default()
    }
}

// ============================================================================
// Record-level properties
// ============================================================================

#[test]
fn test_validator_rejects_bad_prices() {
    let base = quote("ABC", "nse_api");
    assert!(validate(&base));

    for (ltp, prev_close) in [(0.0, 100.0), (-5.0, 100.0), (112.0, 0.0), (151.0, 100.0), (49.0, 100.0)] {
        let mut r = base.clone();
        r.ltp = ltp;
        r.prev_close = prev_close;
        assert!(!validate(&r), "ltp {} prev_close {}", ltp, prev_close);
    }
}

#[test]
fn test_synthetic_source_rejected_regardless_of_values() {
    let r = quote("ABC", "synthetic_fill");
    assert!(!validate(&r));
}

#[test]
fn test_merge_fills_open_interest_and_joins_sources() {
    let first = QuoteRecord {
        total_oi: 0,
        ..quote("XYZ", "scrapeA")
    };
    let second = QuoteRecord {
        total_oi: 5000,
        ..quote("XYZ", "toolkitB")
    };

    let merged = merge(&first, &second);
    assert_eq!(merged.total_oi, 5000);
    assert_eq!(merged.source, "scrapeA,toolkitB");

    let again = merge(&merged, &merged);
    assert_eq!(again, merged);
}

// ============================================================================
// Screening
// ============================================================================

#[test]
fn test_scenario_one_passes_with_expected_score() {
    let result = ScreenerEngine::default().screen(&[scenario_one()]);
    assert_eq!(result.candidates.len(), 1);

    let c = &result.candidates[0];
    assert_eq!(c.gap_up_percentage, 4.76);
    assert_eq!(c.percentage_change, 12.0);
    // gap 9.52 + momentum 24 + volume band (>1k) 2 + no open interest
    assert_eq!(c.filter_score, 35.52);
}

#[test]
fn test_scenario_two_substitutes_prev_close() {
    let record = QuoteRecord {
        prev_day_high: 0.0,
        open_price: 108.0,
        ltp: 108.0,
        ..scenario_one()
    };

    let metrics = GapUpGate::default().evaluate(&record).unwrap();
    assert_eq!(metrics.reference_high, 100.0);
    assert!((metrics.gap_up_percentage - 8.0).abs() < 1e-9);

    let result = ScreenerEngine::default().screen(&[record]);
    assert_eq!(result.candidates.len(), 1);
    assert_eq!(result.candidates[0].gap_up_percentage, 8.0);
    assert_eq!(result.gate_stats.substituted_reference, 1);
}

#[test]
fn test_every_candidate_opens_above_reference() {
    let mut records = Vec::new();
    for (i, open) in [95.0, 104.0, 105.0, 106.0, 110.0, 120.0, 140.0].iter().enumerate() {
        records.push(QuoteRecord {
            symbol: format!("S{}", i),
            open_price: *open,
            ..scenario_one()
        });
    }

    let result = ScreenerEngine::default().screen(&records);
    assert!(!result.candidates.is_empty());
    for c in &result.candidates {
        assert!(c.record.open_price > c.record.prev_day_high);
        assert!(c.filter_score <= 100.0);
    }
    assert!(validate_results(&result.candidates, &FilterConfig::default()).valid > 0);
}

#[test]
fn test_threshold_change_moves_momentum_gate() {
    let gate = GapUpGate::new(FilterConfig::default().with_min_percentage_increase(12.5));
    assert_eq!(gate.evaluate(&scenario_one()), Err(GateCriterion::Momentum));
}

// ============================================================================
// Scan Cycle
// ============================================================================

fn scanner(sources: Vec<Arc<MockSource>>) -> Scanner {
    let mut orch = AcquisitionOrchestrator::new(test_config(), QuoteValidator::default());
    for s in sources {
        orch.register(s);
    }
    Scanner::new(orch, ScreenerEngine::default())
}

#[tokio::test]
async fn test_run_cycle_end_to_end() {
    let mut breakout = quote("DEF", "fyers");
    breakout.ltp = 120.0;
    breakout.open_price = 107.0;
    breakout.volume = 200_000;
    breakout.total_oi = 1100;
    breakout.change_in_oi = 100;

    let mut flat = quote("FLAT", "nse_api");
    flat.open_price = 100.0;

    let nse = Arc::new(
        MockSource::new("nse_api", 1)
            .discovering(&["ABC", "DEF", "FLAT"])
            .serving(&["ABC"])
            .with_record(flat),
    );
    let fyers = Arc::new(
        MockSource::new("fyers", 3)
            .with_record(breakout)
            .with_open_interest(),
    );

    let outcome = assert_ok!(scanner(vec![nse, fyers]).run_cycle().await);

    assert_eq!(outcome.universe_size, 3);
    assert_eq!(outcome.coverage.resolved, 3);
    assert_eq!(outcome.gate_stats.no_gap_up, 1);

    let ordered: Vec<_> = outcome.candidates.iter().map(|c| c.record.symbol.as_str()).collect();
    assert_eq!(ordered, vec!["DEF", "ABC"]);
    assert_eq!(outcome.summary.total_filtered, 2);
    assert_eq!(outcome.summary.top_performers[0].symbol, "DEF");
    assert_eq!(outcome.candidates[0].data_quality, DataQuality::Excellent);

    assert_eq!(outcome.signals.len(), 1);
    assert_eq!(outcome.signals[0].symbol, "DEF");
    assert_eq!(outcome.signals[0].signal, Signal::Buy);

    let json = serde_json::to_value(&outcome).unwrap();
    assert!(json["cycle_id"].is_string());
    assert_eq!(json["candidates"][0]["symbol"], "DEF");
}

#[tokio::test]
async fn test_run_cycle_without_sources_fails() {
    let err = assert_err!(scanner(Vec::new()).run_cycle().await);
    assert_eq!(err, ScanError::NoSourcesConfigured);
}
