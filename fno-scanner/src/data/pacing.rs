//! Human-cadence request pacing.
//!
//! Providers throttle or ban clients that fire requests at machine speed.
//! Calls to one source are spaced with a small randomized delay, and
//! consecutive batches with a longer randomized pause.

use fno_common::config::{DataSourcesConfig, DelayRange};
use rand::Rng;
use std::time::Duration;
use tracing::trace;

/// Randomized delays between calls and batches for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestPacer {
    call_delay: DelayRange,
    batch_pause: DelayRange,
}

impl RequestPacer {
    pub const fn new(call_delay: DelayRange, batch_pause: DelayRange) -> Self {
        Self {
            call_delay,
            batch_pause,
        }
    }

    /// Pacer that never sleeps.
    pub const fn immediate() -> Self {
        Self::new(DelayRange::none(), DelayRange::none())
    }

    /// Build from the acquisition section of the config.
    pub fn from_config(config: &DataSourcesConfig) -> Self {
        Self::new(config.call_delay, config.batch_pause)
    }

    /// Sleep for a randomized interval between two calls.
    pub async fn between_calls(&self) {
        Self::sleep(self.call_delay, "call").await;
    }

    /// Sleep for a randomized interval between two batches.
    pub async fn between_batches(&self) {
        Self::sleep(self.batch_pause, "batch").await;
    }

    /// Draw a delay from `range`.
    pub fn sample(range: DelayRange) -> Duration {
        if range.max_ms == 0 {
            return Duration::ZERO;
        }
        let lo = range.min_ms.min(range.max_ms);
        let hi = range.max_ms.max(range.min_ms);
        let ms = rand::thread_rng().gen_range(lo..=hi);
        Duration::from_millis(ms)
    }

    async fn sleep(range: DelayRange, kind: &'static str) {
        let delay = Self::sample(range);
        if delay.is_zero() {
            return;
        }
        trace!(kind, delay_ms = delay.as_millis() as u64, "Pacing request");
        tokio::time::sleep(delay).await;
    }
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::from_config(&DataSourcesConfig::default())
    }
}
