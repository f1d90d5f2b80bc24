//! Invariant: the adaptive timeout always lands in [base, max].

use crossbar_timeout::AdaptiveTimeoutConfig;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(60))]

    #[test]
    fn timeout_stays_within_bounds(
        base_ms in 1u64..=2000,
        extra_ms in 0u64..=10_000,
        latencies in prop::collection::vec(0u64..=60_000, 0..60),
        failures in 0usize..=40,
    ) {
        let base = Duration::from_millis(base_ms);
        let max = Duration::from_millis(base_ms + extra_ms);
        let timeout = AdaptiveTimeoutConfig::builder()
            .base_timeout(base)
            .max_timeout(max)
            .build();

        for latency in &latencies {
            timeout.record_success(Duration::from_millis(*latency));
        }
        for _ in 0..failures {
            timeout.record_failure();
        }

        let current = timeout.current_timeout();
        prop_assert!(current >= base, "current {current:?} < base {base:?}");
        prop_assert!(current <= max, "current {current:?} > max {max:?}");
    }

    #[test]
    fn below_sample_floor_base_is_returned(
        samples in 0u64..10,
        latency_ms in 1u64..=100_000,
    ) {
        let timeout = AdaptiveTimeoutConfig::builder()
            .base_timeout(Duration::from_millis(250))
            .max_timeout(Duration::from_secs(60))
            .build();
        for _ in 0..samples {
            timeout.record_success(Duration::from_millis(latency_ms));
        }
        prop_assert_eq!(timeout.current_timeout(), Duration::from_millis(250));
    }
}
