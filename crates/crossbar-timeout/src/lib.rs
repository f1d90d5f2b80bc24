//! Adaptive per-attempt timeouts.
//!
//! Tracks a count-weighted mean of successful response times per service and
//! derives the next attempt's deadline from it:
//!
//! ```text
//! multiplier = 2 × (1 + failure_rate)
//! timeout    = clamp(base, max, mean × multiplier)
//! ```
//!
//! Until ten observations exist the base timeout is returned unchanged.
//! Attempts that failed by timing out are excluded from the mean (their
//! latency says nothing about the healthy distribution) but still count as
//! failures, which widens the multiplier.

mod config;

pub use config::{AdaptiveTimeoutConfig, AdaptiveTimeoutConfigBuilder};

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Observations required before the adaptive value takes over.
const MIN_SAMPLES: u64 = 10;

/// Point-in-time view for the observability surface.
#[derive(Debug, Clone, Serialize)]
pub struct AdaptiveTimeoutSnapshot {
    #[serde(with = "millis")]
    pub base_timeout: Duration,
    #[serde(with = "millis")]
    pub max_timeout: Duration,
    pub success_mean_ms: f64,
    pub success_count: u64,
    pub failure_count: u64,
    #[serde(with = "millis")]
    pub current_timeout: Duration,
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[derive(Debug, Default)]
struct Stats {
    success_mean_ms: f64,
    success_count: u64,
    failure_count: u64,
}

impl Stats {
    fn observations(&self) -> u64 {
        self.success_count + self.failure_count
    }

    fn failure_rate(&self) -> f64 {
        let total = self.observations();
        if total == 0 {
            0.0
        } else {
            self.failure_count as f64 / total as f64
        }
    }
}

/// Adaptive timeout state for one service. Shared via `Arc`.
pub struct AdaptiveTimeout {
    base: Duration,
    max: Duration,
    stats: Mutex<Stats>,
    name: String,
}

impl AdaptiveTimeout {
    pub(crate) fn new(base: Duration, max: Duration, name: String) -> Arc<Self> {
        Arc::new(Self {
            base,
            max: max.max(base),
            stats: Mutex::new(Stats::default()),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Deadline for the next attempt. Always within `[base, max]`.
    pub fn current_timeout(&self) -> Duration {
        let stats = self.stats.lock();
        self.compute(&stats)
    }

    fn compute(&self, stats: &Stats) -> Duration {
        if stats.observations() < MIN_SAMPLES || stats.success_count == 0 {
            return self.base;
        }
        let multiplier = 2.0 * (1.0 + stats.failure_rate());
        let adaptive = Duration::from_secs_f64(stats.success_mean_ms * multiplier / 1000.0);
        adaptive.clamp(self.base, self.max)
    }

    /// Records a successful attempt's latency.
    pub fn record_success(&self, latency: Duration) {
        let mut stats = self.stats.lock();
        stats.success_count += 1;
        let n = stats.success_count as f64;
        let x = latency.as_secs_f64() * 1000.0;
        stats.success_mean_ms += (x - stats.success_mean_ms) / n;
    }

    /// Records a failed attempt. Timeout failures go through here too; the
    /// latency of a timed-out attempt is never folded into the mean.
    pub fn record_failure(&self) {
        let mut stats = self.stats.lock();
        stats.failure_count += 1;
        tracing::trace!(
            timeout = %self.name,
            failures = stats.failure_count,
            "failure recorded for adaptive timeout"
        );
    }

    /// Clears accumulated statistics.
    pub fn reset(&self) {
        *self.stats.lock() = Stats::default();
    }

    pub fn snapshot(&self) -> AdaptiveTimeoutSnapshot {
        let stats = self.stats.lock();
        AdaptiveTimeoutSnapshot {
            base_timeout: self.base,
            max_timeout: self.max,
            success_mean_ms: stats.success_mean_ms,
            success_count: stats.success_count,
            failure_count: stats.failure_count,
            current_timeout: self.compute(&stats),
        }
    }
}
