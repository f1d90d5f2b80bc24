//! Invariant: admissions in any interval never exceed burst + rps × Δ + 1.

use crossbar_ratelimiter::RateLimiterConfig;
use proptest::prelude::*;
use std::time::{Duration, Instant};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(30))]

    /// With no time for refill, admissions are bounded by the burst.
    #[test]
    fn immediate_admissions_bounded_by_burst(
        burst in 1usize..=50,
        tries in 1usize..=300,
    ) {
        let limiter = RateLimiterConfig::builder()
            .requests_per_second(1.0)
            .burst_capacity(burst)
            .build();

        let mut admitted = 0usize;
        for _ in 0..tries {
            if limiter.try_acquire() {
                admitted += 1;
            }
        }
        // One token of slack for refill during the loop itself.
        prop_assert!(admitted <= burst + 1);
    }

    /// Over a real interval, the refill bound holds.
    #[test]
    fn interval_admissions_bounded_by_rate(
        rps in 10.0f64..=500.0,
        burst in 1usize..=20,
    ) {
        let limiter = RateLimiterConfig::builder()
            .requests_per_second(rps)
            .burst_capacity(burst)
            .build();

        let window = Duration::from_millis(50);
        let start = Instant::now();
        let mut admitted = 0usize;
        while start.elapsed() < window {
            if limiter.try_acquire() {
                admitted += 1;
            }
        }
        let elapsed = start.elapsed().as_secs_f64();
        let bound = burst as f64 + rps * elapsed + 1.0;
        prop_assert!(
            (admitted as f64) <= bound,
            "admitted {} > bound {}",
            admitted,
            bound
        );
    }

    /// Tokens never exceed the burst capacity.
    #[test]
    fn snapshot_tokens_never_exceed_burst(
        rps in 1.0f64..=1000.0,
        burst in 1usize..=100,
        drains in 0usize..=50,
    ) {
        let limiter = RateLimiterConfig::builder()
            .requests_per_second(rps)
            .burst_capacity(burst)
            .build();
        for _ in 0..drains {
            let _ = limiter.try_acquire();
        }
        let snapshot = limiter.snapshot();
        prop_assert!(snapshot.tokens <= burst as f64 + f64::EPSILON);
    }
}
