//! Field-level consolidation of records for the same symbol.
//!
//! Resolution policy:
//! - `source`: union of provenance tags, deduplicated, never overwritten
//! - numeric fields: a non-zero incoming value wins, zero keeps the existing one
//! - `symbol`: existing unless empty
//! - previous-session block: an incoming block with weaker provenance
//!   (estimated vs. sourced) never replaces a stronger one

use std::collections::HashMap;

use super::QuoteRecord;

fn pick_f64(existing: f64, incoming: f64) -> f64 {
    if incoming != 0.0 && incoming.is_finite() {
        incoming
    } else {
        existing
    }
}

fn pick_u64(existing: u64, incoming: u64) -> u64 {
    if incoming != 0 {
        incoming
    } else {
        existing
    }
}

fn pick_i64(existing: i64, incoming: i64) -> i64 {
    if incoming != 0 {
        incoming
    } else {
        existing
    }
}

/// Combine two records for the same instrument.
///
/// `merge(x, x)` returns `x` with its source tags deduplicated.
pub fn merge(existing: &QuoteRecord, incoming: &QuoteRecord) -> QuoteRecord {
    let mut merged = QuoteRecord {
        symbol: if existing.symbol.is_empty() {
            incoming.symbol.clone()
        } else {
            existing.symbol.clone()
        },
        open_price: pick_f64(existing.open_price, incoming.open_price),
        high_price: pick_f64(existing.high_price, incoming.high_price),
        low_price: pick_f64(existing.low_price, incoming.low_price),
        ltp: pick_f64(existing.ltp, incoming.ltp),
        prev_close: pick_f64(existing.prev_close, incoming.prev_close),
        prev_day_open: existing.prev_day_open,
        prev_day_high: existing.prev_day_high,
        prev_day_low: existing.prev_day_low,
        volume: pick_u64(existing.volume, incoming.volume),
        total_oi: pick_u64(existing.total_oi, incoming.total_oi),
        change_in_oi: pick_i64(existing.change_in_oi, incoming.change_in_oi),
        source: String::new(),
        prev_day_provenance: existing.prev_day_provenance,
    };

    if incoming.prev_day_provenance >= existing.prev_day_provenance {
        merged.prev_day_open = pick_f64(existing.prev_day_open, incoming.prev_day_open);
        merged.prev_day_high = pick_f64(existing.prev_day_high, incoming.prev_day_high);
        merged.prev_day_low = pick_f64(existing.prev_day_low, incoming.prev_day_low);
        merged.prev_day_provenance = incoming.prev_day_provenance;
    }

    for tag in existing.source_tags().chain(incoming.source_tags()) {
        merged.add_source_tag(tag);
    }

    merged
}

/// Collapse duplicate symbols, keeping first-seen order.
pub fn consolidate(records: impl IntoIterator<Item = QuoteRecord>) -> Vec<QuoteRecord> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<QuoteRecord> = Vec::new();

    for record in records {
        match index.get(&record.symbol) {
            Some(&i) => {
                out[i] = merge(&out[i], &record);
            }
            None => {
                index.insert(record.symbol.clone(), out.len());
                out.push(record);
            }
        }
    }

    out
}
