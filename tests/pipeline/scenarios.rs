//! Seed end-to-end scenarios: mapping, retry, breaker and bulkhead behavior
//! observed through the public client surface.

use super::support::{Reply, ScriptedTransport};
use crossbar_client::{Client, CrossbarConfig};
use crossbar_core::{ErrorCategory, Protocol, Request, Retryable, ServiceError};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_retry_config(max_attempts: u32) -> CrossbarConfig {
    let mut config = CrossbarConfig::default();
    config.retry.max_attempts = max_attempts;
    config.retry.base_backoff_ms = 10;
    config.retry.max_backoff_ms = 50;
    config.retry.jitter = 0.0;
    config
}

fn client_with(transport: Arc<ScriptedTransport>, config: CrossbarConfig) -> Client {
    Client::rest()
        .config(config)
        .transport(transport)
        .build()
        .unwrap()
}

#[tokio::test]
async fn not_found_maps_with_enriched_message() {
    let transport = ScriptedTransport::new(vec![Reply::status(404, r#"{"error":"User not found"}"#)]);
    let client = client_with(Arc::clone(&transport), fast_retry_config(3));

    let request = Request::builder(Protocol::Rest, "users")
        .endpoint("/users/999")
        .method("GET")
        .request_id("req-users-999")
        .build();
    let error = client.execute(request).await.unwrap_err();

    assert!(matches!(error, ServiceError::NotFound { .. }));
    assert_eq!(error.category(), ErrorCategory::Client);
    assert!(!error.is_retryable());
    assert!(error.context().elapsed > Duration::ZERO);

    let message = error.to_string();
    assert!(message.contains("User not found"));
    assert!(message.contains("404"));
    assert!(message.contains("users"));
    assert!(message.contains("req-users-999"));

    // Non-retryable: exactly one transport invocation despite maxAttempts=3.
    assert_eq!(transport.invocations(), 1);
}

#[tokio::test]
async fn rate_limit_honours_retry_after_header() {
    let transport = ScriptedTransport::new(vec![Reply::Http {
        status: 429,
        headers: vec![("Retry-After", "120")],
        body: r#"{"error":"Rate limit exceeded"}"#,
    }]);
    let mut config = fast_retry_config(1);
    config.retry.max_attempts = 1;
    let client = client_with(Arc::clone(&transport), config);

    let request = Request::builder(Protocol::Rest, "api")
        .endpoint("/api/limited")
        .method("GET")
        .build();
    let error = client.execute(request).await.unwrap_err();

    assert!(matches!(error, ServiceError::RateLimit { .. }));
    assert!(error.is_retryable());
    assert_eq!(error.suggested_delay(), Some(Duration::from_secs(120)));
    assert!(error.to_string().contains("Rate limit exceeded"));
}

#[tokio::test]
async fn retries_on_500_then_succeeds() {
    let transport = ScriptedTransport::new(vec![
        Reply::status(500, "boom"),
        Reply::status(500, "boom"),
        Reply::ok(r#"{"data":42}"#),
    ]);
    let client = client_with(Arc::clone(&transport), fast_retry_config(3));

    let request = Request::builder(Protocol::Rest, "api")
        .endpoint("/api/data")
        .method("GET")
        .build();

    let started = Instant::now();
    let response = client.execute(request).await.unwrap();
    let elapsed = started.elapsed();

    assert!(response.is_success());
    assert_eq!(response.body(), br#"{"data":42}"#.as_slice());
    assert_eq!(transport.invocations(), 3);
    // Two backoffs ran, each capped at maxBackoff (50ms) and at least the
    // base (10ms).
    assert!(elapsed >= Duration::from_millis(20), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn circuit_opens_after_consecutive_failures() {
    let transport = ScriptedTransport::new(vec![Reply::Io("connection refused")]);
    let mut config = fast_retry_config(1);
    config.circuit.failure_rate_threshold = 100.0;
    config.circuit.sliding_window_size = 5;
    config.circuit.minimum_number_of_calls = 5;
    config.circuit.wait_duration_in_open_ms = 60_000;
    let client = client_with(Arc::clone(&transport), config);

    for _ in 0..5 {
        let request = Request::builder(Protocol::Rest, "flaky").endpoint("/x").build();
        let error = client.execute(request).await.unwrap_err();
        assert!(matches!(error, ServiceError::Connection { .. }));
    }
    assert_eq!(transport.invocations(), 5);

    // Sixth call: rejected at the gate, zero further transport invocations.
    let request = Request::builder(Protocol::Rest, "flaky").endpoint("/x").build();
    let error = client.execute(request).await.unwrap_err();
    assert!(matches!(error, ServiceError::CircuitBreakerOpen { .. }));
    assert_eq!(error.category(), ErrorCategory::Circuit);
    assert_eq!(transport.invocations(), 5);
}

#[tokio::test]
async fn bulkhead_rejects_third_concurrent_call_quickly() {
    let transport = ScriptedTransport::with_delay(
        vec![Reply::ok("slow")],
        Duration::from_millis(200),
    );
    let mut config = fast_retry_config(1);
    config.bulkhead.max_concurrent = 2;
    config.bulkhead.max_wait_ms = 50;
    let client = client_with(Arc::clone(&transport), config);

    let spawn_call = |client: Client| {
        tokio::spawn(async move {
            let request = Request::builder(Protocol::Rest, "busy").endpoint("/x").build();
            client.execute(request).await
        })
    };

    let first = spawn_call(client.clone());
    let second = spawn_call(client.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;

    let started = Instant::now();
    let request = Request::builder(Protocol::Rest, "busy").endpoint("/x").build();
    let error = client.execute(request).await.unwrap_err();
    let rejected_in = started.elapsed();

    assert!(matches!(error, ServiceError::BulkheadFull { .. }));
    assert!(error.is_retryable());
    assert!(
        rejected_in < Duration::from_millis(150),
        "rejection took {rejected_in:?}"
    );

    assert!(first.await.unwrap().is_ok());
    assert!(second.await.unwrap().is_ok());
}

#[tokio::test]
async fn caller_deadline_is_fatal_no_retry() {
    let transport = ScriptedTransport::with_delay(
        vec![Reply::ok("late")],
        Duration::from_millis(500),
    );
    let client = client_with(Arc::clone(&transport), fast_retry_config(3));

    let request = Request::builder(Protocol::Rest, "slow")
        .endpoint("/x")
        .timeout(Duration::from_millis(50))
        .build();
    let error = client.execute(request).await.unwrap_err();

    assert!(matches!(error, ServiceError::Timeout { .. }));
    // Deadline exceeded ends the call outright.
    assert_eq!(transport.invocations(), 1);
}
