//! Invariants: every HTTP status maps to a stable variant with exactly one
//! category and a deterministic retryability verdict.

use crossbar_core::{map_http, ErrorCategory, HeaderMap, Retryable, ServiceError};
use proptest::prelude::*;

fn ctx() -> crossbar_core::ErrorContext {
    crossbar_core::ErrorContext::builder("svc", "/x").request_id("r").build()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(120))]

    /// Mapping is a pure function of the status for any body.
    #[test]
    fn mapping_is_stable_across_bodies(
        status in 100i32..=599,
        body in ".{0,64}",
    ) {
        let a = map_http(status, body.as_bytes(), &HeaderMap::new(), ctx());
        let b = map_http(status, b"", &HeaderMap::new(), ctx());
        prop_assert_eq!(a.kind_name(), b.kind_name());
        prop_assert_eq!(a.category(), b.category());
        prop_assert_eq!(a.is_retryable(), b.is_retryable());
        // The wire status is never lost.
        prop_assert_eq!(a.context().http_status, Some(status));
    }

    /// Retryability matches the taxonomy table for every status.
    #[test]
    fn retryability_follows_the_table(status in 100i32..=599) {
        let error = map_http(status, b"", &HeaderMap::new(), ctx());
        let expected = matches!(status, 408 | 429 | 500 | 502 | 503 | 504);
        prop_assert_eq!(error.is_retryable(), expected, "status {}", status);
    }

    /// Exactly one category per error; categories partition the statuses.
    #[test]
    fn category_partition(status in 400i32..=599) {
        let error = map_http(status, b"", &HeaderMap::new(), ctx());
        let category = error.category();
        let expected = match status {
            400 | 422 => ErrorCategory::Validation,
            401 | 403 => ErrorCategory::Auth,
            404 | 409 => ErrorCategory::Client,
            408 => ErrorCategory::Timeout,
            429 => ErrorCategory::RateLimit,
            500 | 502 | 503 | 504 => ErrorCategory::Server,
            _ => ErrorCategory::Unknown,
        };
        prop_assert_eq!(category, expected, "status {}", status);
        if expected == ErrorCategory::Unknown {
            let is_unknown = matches!(error, ServiceError::Unknown { .. });
            prop_assert!(is_unknown);
        }
    }
}
