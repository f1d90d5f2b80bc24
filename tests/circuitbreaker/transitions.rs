//! State transitions observed through listeners form valid paths.

use crossbar_circuitbreaker::{CircuitBreakerConfig, CircuitState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn observed_transitions_form_a_valid_path() {
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&transitions);

    let breaker = CircuitBreakerConfig::builder()
        .failure_rate_threshold(1.0)
        .sliding_window_size(3)
        .minimum_number_of_calls(3)
        .wait_duration_in_open(Duration::from_millis(30))
        .permitted_probes(1)
        .name("path")
        .on_state_transition(move |from, to| {
            sink.lock().push((from, to));
        })
        .build();

    // closed → open
    for _ in 0..3 {
        breaker
            .try_acquire()
            .unwrap()
            .record_failure(Duration::from_millis(1));
    }
    // open → half-open (after wait) → open (probe fails)
    std::thread::sleep(Duration::from_millis(40));
    breaker
        .try_acquire()
        .unwrap()
        .record_failure(Duration::from_millis(1));
    // open → half-open → closed (probe succeeds)
    std::thread::sleep(Duration::from_millis(40));
    breaker
        .try_acquire()
        .unwrap()
        .record_success(Duration::from_millis(1));

    let path = transitions.lock().clone();
    assert_eq!(
        path,
        vec![
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );

    // Every edge is one the state machine allows.
    for (from, to) in path {
        let allowed = matches!(
            (from, to),
            (CircuitState::Closed, CircuitState::Open)
                | (CircuitState::Open, CircuitState::HalfOpen)
                | (CircuitState::HalfOpen, CircuitState::Open)
                | (CircuitState::HalfOpen, CircuitState::Closed)
        );
        assert!(allowed, "illegal transition {from:?} -> {to:?}");
    }
}

#[test]
fn reopened_circuit_requires_a_fresh_wait() {
    let breaker = CircuitBreakerConfig::builder()
        .failure_rate_threshold(1.0)
        .sliding_window_size(2)
        .minimum_number_of_calls(2)
        .wait_duration_in_open(Duration::from_millis(50))
        .name("fresh-timer")
        .build();

    for _ in 0..2 {
        breaker
            .try_acquire()
            .unwrap()
            .record_failure(Duration::from_millis(1));
    }
    std::thread::sleep(Duration::from_millis(60));

    // Failed probe reopens; the gate must reject immediately again.
    breaker
        .try_acquire()
        .unwrap()
        .record_failure(Duration::from_millis(1));
    assert_eq!(breaker.state(), CircuitState::Open);
    assert!(breaker.try_acquire().is_err());
}
