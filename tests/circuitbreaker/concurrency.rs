//! Concurrency guarantees: probe bounds and race-free recording.

use crossbar_circuitbreaker::{CircuitBreakerConfig, CircuitState};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn at_most_permitted_probes_in_half_open() {
    let breaker = CircuitBreakerConfig::builder()
        .failure_rate_threshold(1.0)
        .sliding_window_size(4)
        .minimum_number_of_calls(4)
        .wait_duration_in_open(Duration::from_millis(20))
        .permitted_probes(3)
        .name("probe-bound")
        .build();

    for _ in 0..4 {
        breaker
            .try_acquire()
            .unwrap()
            .record_failure(Duration::from_millis(1));
    }
    assert_eq!(breaker.state(), CircuitState::Open);
    tokio::time::sleep(Duration::from_millis(30)).await;

    // Many tasks race for probe slots. Admitted permits are held, not
    // resolved, so no transition can free slots mid-measurement: the CAS
    // bound must hold exactly.
    let admitted = Arc::new(AtomicUsize::new(0));
    let held = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for _ in 0..32 {
        let breaker = Arc::clone(&breaker);
        let admitted = Arc::clone(&admitted);
        let held = Arc::clone(&held);
        handles.push(tokio::spawn(async move {
            if let Ok(permit) = breaker.try_acquire() {
                admitted.fetch_add(1, Ordering::SeqCst);
                held.lock().push(permit);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 3);

    // Resolving every probe successfully closes the circuit.
    for permit in held.lock().drain(..) {
        permit.record_success(Duration::from_millis(1));
    }
    assert_eq!(breaker.state(), CircuitState::Closed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_recording_keeps_window_consistent() {
    let breaker = CircuitBreakerConfig::builder()
        .failure_rate_threshold(0.99)
        .sliding_window_size(64)
        .minimum_number_of_calls(64)
        .name("window-race")
        .build();

    let mut handles = Vec::new();
    for i in 0..64 {
        let breaker = Arc::clone(&breaker);
        handles.push(tokio::spawn(async move {
            let permit = breaker.try_acquire().unwrap();
            if i % 2 == 0 {
                permit.record_success(Duration::from_millis(1));
            } else {
                permit.record_failure(Duration::from_millis(1));
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = breaker.snapshot();
    assert_eq!(snapshot.total_calls, 64);
    assert_eq!(snapshot.failure_count, 32);
    assert_eq!(breaker.state(), CircuitState::Closed);
}
