//! Invariant: in-flight calls never exceed the configured capacity.

use crossbar_bulkhead::BulkheadConfig;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(20))]

    #[test]
    fn in_flight_never_exceeds_capacity(
        capacity in 1usize..=8,
        callers in 1usize..=40,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async move {
            let bulkhead = BulkheadConfig::builder()
                .max_concurrent(capacity)
                .max_wait(Duration::from_secs(2))
                .build();

            let current = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));

            let mut handles = Vec::new();
            for _ in 0..callers {
                let bulkhead = Arc::clone(&bulkhead);
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                handles.push(tokio::spawn(async move {
                    if let Ok(_permit) = bulkhead.acquire().await {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }
            assert!(peak.load(Ordering::SeqCst) <= capacity);
        });
    }

    #[test]
    fn rejections_only_when_saturated(
        capacity in 1usize..=4,
    ) {
        let rt = Runtime::new().unwrap();
        rt.block_on(async move {
            let bulkhead = BulkheadConfig::builder()
                .max_concurrent(capacity)
                .max_wait(Duration::from_millis(10))
                .build();

            // Fill every slot.
            let mut held = Vec::new();
            for _ in 0..capacity {
                held.push(bulkhead.acquire().await.unwrap());
            }
            assert!(bulkhead.acquire().await.is_err());

            // Freeing one slot admits exactly one more.
            held.pop();
            assert!(bulkhead.acquire().await.is_ok());
        });
    }
}
