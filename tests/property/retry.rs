//! Invariants: retryability is decided solely by the variant, waits stay
//! within the configured bounds, and the attempt budget is exact.

use crossbar_core::{ErrorContext, Protocol, ServiceError};
use crossbar_retry::{RetryDecision, RetryPolicy};
use proptest::prelude::*;
use std::time::Duration;

fn ctx() -> Box<ErrorContext> {
    Box::new(
        ErrorContext::builder("svc", "/x")
            .protocol(Protocol::Rest)
            .request_id("r")
            .build(),
    )
}

fn retryable_error() -> ServiceError {
    ServiceError::Connection {
        context: ctx(),
        message: "reset".into(),
    }
}

fn non_retryable_error() -> ServiceError {
    ServiceError::Validation {
        context: ctx(),
        message: "bad".into(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(60))]

    #[test]
    fn waits_never_exceed_max_backoff(
        base_ms in 1u64..=1000,
        max_ms in 1u64..=5000,
        jitter in 0.0f64..0.99,
        attempt in 0u32..=10,
    ) {
        let policy = RetryPolicy::builder()
            .max_attempts(20)
            .base_backoff(Duration::from_millis(base_ms))
            .max_backoff(Duration::from_millis(max_ms))
            .jitter(jitter)
            .build();

        if let RetryDecision::Retry { delay } = policy.decide(&retryable_error(), attempt, None) {
            prop_assert!(delay <= Duration::from_millis(max_ms));
        }
    }

    #[test]
    fn non_retryable_errors_never_retry(
        attempt in 0u32..=10,
        max_attempts in 1u32..=20,
    ) {
        let policy = RetryPolicy::builder().max_attempts(max_attempts).build();
        prop_assert_eq!(
            policy.decide(&non_retryable_error(), attempt, None),
            RetryDecision::Abort
        );
    }

    #[test]
    fn attempt_budget_is_exact(max_attempts in 1u32..=10) {
        let policy = RetryPolicy::builder()
            .max_attempts(max_attempts)
            .base_backoff(Duration::from_millis(1))
            .max_backoff(Duration::from_millis(2))
            .jitter(0.0)
            .build();

        let mut attempts = 1u32;
        let mut attempt = 0u32;
        while let RetryDecision::Retry { .. } = policy.decide(&retryable_error(), attempt, None) {
            attempts += 1;
            attempt += 1;
        }
        prop_assert_eq!(attempts, max_attempts);
    }

    #[test]
    fn jitter_only_shrinks_the_wait(
        attempt in 0u32..=6,
        jitter in 0.0f64..0.9,
    ) {
        let policy = RetryPolicy::builder()
            .max_attempts(20)
            .base_backoff(Duration::from_secs(2))
            .max_backoff(Duration::from_secs(64))
            .jitter(jitter)
            .build();
        let unjittered = RetryPolicy::builder()
            .max_attempts(20)
            .base_backoff(Duration::from_secs(2))
            .max_backoff(Duration::from_secs(64))
            .jitter(0.0)
            .build();

        let reference = match unjittered.decide(&retryable_error(), attempt, None) {
            RetryDecision::Retry { delay } => delay,
            RetryDecision::Abort => return Ok(()),
        };
        if let RetryDecision::Retry { delay } = policy.decide(&retryable_error(), attempt, None) {
            prop_assert!(delay <= reference);
        }
    }
}
