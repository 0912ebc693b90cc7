//! FNO Scanner Library
//!
//! Screens NSE futures-and-options equities for gap-up openings with strong
//! momentum, using quotes gathered from several unreliable providers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          fno-scanner                                │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────┐     │
//! │  │  Acquisition    │  │  Validator +    │  │  Screener       │     │
//! │  │  Orchestrator   │─▶│  Merger         │─▶│  (gate, score)  │     │
//! │  └────────┬────────┘  └─────────────────┘  └─────────────────┘     │
//! │           │                                                         │
//! │  nse_api → nse_toolkit → fyers → yfinance                           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Concepts
//!
//! ## Degrading-trust cascade
//! - Every provider implements [`data::QuoteSource`]
//! - Later providers only see symbols earlier ones failed to resolve
//! - Provider failures degrade to "no data", never to an error
//!
//! ## Provenance
//! - Previous-day OHLC is either sourced, estimated from previous close, or absent
//! - Estimates carry a `:prev_est` tag so they are never mistaken for real data

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod data;
pub mod scan;
pub mod screener;

pub use data::{AcquisitionOrchestrator, AcquisitionReport, QuoteRecord, QuoteSource, ScanError};
pub use scan::{CycleTimings, ScanOutcome, Scanner};
pub use screener::{DataQuality, FilteredCandidate, ScreenerEngine};
