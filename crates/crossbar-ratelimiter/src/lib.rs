//! Token-bucket rate limiting per service.
//!
//! The bucket holds fractional tokens that refill lazily: each acquire
//! computes the elapsed monotonic time since the last refill and credits
//! `elapsed × rate`, saturating at the burst capacity. `try_acquire` never
//! waits; a caller that is refused decides for itself whether to back off.
//!
//! ```
//! use crossbar_ratelimiter::RateLimiterConfig;
//!
//! let limiter = RateLimiterConfig::builder()
//!     .requests_per_second(100.0)
//!     .burst_capacity(20)
//!     .name("search")
//!     .build();
//!
//! if limiter.try_acquire() {
//!     // admitted
//! }
//! ```

mod config;
mod events;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use events::RateLimiterEvent;

use crossbar_core::EventListeners;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Point-in-time view for the observability surface.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimiterSnapshot {
    pub tokens: f64,
    pub refill_rate: f64,
    pub burst_capacity: usize,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, now: Instant, rate: f64, burst: f64) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            self.tokens = (self.tokens + elapsed * rate).min(burst);
            self.last_refill = now;
        }
    }
}

pub(crate) struct Shared {
    pub(crate) requests_per_second: f64,
    pub(crate) burst_capacity: usize,
    pub(crate) events: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

/// The limiter itself. Shared across calls via `Arc`.
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    shared: Shared,
}

impl RateLimiter {
    pub(crate) fn new(shared: Shared) -> Arc<Self> {
        Arc::new(Self {
            bucket: Mutex::new(Bucket {
                tokens: shared.burst_capacity as f64,
                last_refill: Instant::now(),
            }),
            shared,
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Admits the call when at least one token is available. Non-blocking.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    fn try_acquire_at(&self, now: Instant) -> bool {
        let admitted = {
            let mut bucket = self.bucket.lock();
            bucket.refill(
                now,
                self.shared.requests_per_second,
                self.shared.burst_capacity as f64,
            );
            if bucket.tokens >= 1.0 {
                bucket.tokens -= 1.0;
                true
            } else {
                false
            }
        };

        if admitted {
            self.shared.events.emit(&RateLimiterEvent::Permitted {
                pattern_name: self.shared.name.clone(),
                timestamp: now,
            });
        } else {
            self.shared.events.emit(&RateLimiterEvent::Rejected {
                pattern_name: self.shared.name.clone(),
                timestamp: now,
            });
            tracing::debug!(ratelimiter = %self.shared.name, "rate limit exceeded");
            metrics::counter!("ratelimiter_calls_rejected_total", "ratelimiter" => self.shared.name.clone())
                .increment(1);
        }
        admitted
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        let mut bucket = self.bucket.lock();
        bucket.refill(
            Instant::now(),
            self.shared.requests_per_second,
            self.shared.burst_capacity as f64,
        );
        RateLimiterSnapshot {
            tokens: bucket.tokens,
            refill_rate: self.shared.requests_per_second,
            burst_capacity: self.shared.burst_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(rps: f64, burst: usize) -> Arc<RateLimiter> {
        RateLimiterConfig::builder()
            .requests_per_second(rps)
            .burst_capacity(burst)
            .name("test")
            .build()
    }

    #[test]
    fn burst_is_available_up_front() {
        let l = limiter(1.0, 3);
        assert!(l.try_acquire());
        assert!(l.try_acquire());
        assert!(l.try_acquire());
        assert!(!l.try_acquire());
    }

    #[test]
    fn refill_is_fractional_and_lazy() {
        let l = limiter(10.0, 1);
        assert!(l.try_acquire());
        assert!(!l.try_acquire());
        // 10 req/s → one token back after 100 ms.
        std::thread::sleep(Duration::from_millis(120));
        assert!(l.try_acquire());
        assert!(!l.try_acquire());
    }

    #[test]
    fn refill_saturates_at_burst() {
        let l = limiter(1000.0, 2);
        assert!(l.try_acquire());
        assert!(l.try_acquire());
        std::thread::sleep(Duration::from_millis(50));
        // Plenty of refill time, but only burst-many tokens may accumulate.
        assert!(l.try_acquire());
        assert!(l.try_acquire());
        assert!(!l.try_acquire());
    }

    #[test]
    fn snapshot_reports_configuration() {
        let l = limiter(5.0, 7);
        let snap = l.snapshot();
        assert_eq!(snap.burst_capacity, 7);
        assert_eq!(snap.refill_rate, 5.0);
        assert!(snap.tokens <= 7.0);
    }

    #[test]
    fn admissions_bounded_over_interval() {
        let l = limiter(50.0, 5);
        let window = Duration::from_millis(200);
        let start = Instant::now();
        let mut admitted = 0u32;
        while start.elapsed() < window {
            if l.try_acquire() {
                admitted += 1;
            }
        }
        // burst + rps × Δ + 1 slack
        let bound = 5.0 + 50.0 * window.as_secs_f64() + 1.0;
        assert!(
            (admitted as f64) <= bound,
            "admitted {admitted} > bound {bound}"
        );
    }
}
