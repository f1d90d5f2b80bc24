//! Gate ordering, resource release and cancellation behavior.

use super::support::{Reply, ScriptedTransport};
use crossbar_client::{Client, CrossbarConfig};
use crossbar_core::{Protocol, Request, Retryable, ServiceError};
use crossbar_interceptor::{InterceptFuture, Interceptor, Next};
use crossbar_loadshed::{ProcessSample, ProcessStatsSource};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn single_attempt_config() -> CrossbarConfig {
    let mut config = CrossbarConfig::default();
    config.retry.max_attempts = 1;
    config.retry.jitter = 0.0;
    config
}

#[tokio::test]
async fn interceptor_rewrites_reach_the_transport() {
    struct Tenant;
    impl Interceptor for Tenant {
        fn intercept(&self, request: Request, next: Next) -> InterceptFuture {
            next.run(request.with_header("x-tenant", "acme"))
        }
    }

    struct AssertingTransport;
    impl crossbar_client::Transport for AssertingTransport {
        fn send(
            &self,
            request: Request,
            _deadline: std::time::Instant,
            _cancel: CancellationToken,
        ) -> futures::future::BoxFuture<
            'static,
            Result<crossbar_client::RawResponse, crossbar_client::TransportError>,
        > {
            let tenant = request.headers().get("x-tenant").map(str::to_string);
            Box::pin(async move {
                assert_eq!(tenant.as_deref(), Some("acme"));
                Ok(crossbar_client::RawResponse::ok(b"ok".to_vec()))
            })
        }
    }

    let client = Client::rest()
        .transport(Arc::new(AssertingTransport))
        .interceptor(Tenant)
        .build()
        .unwrap();
    let request = Request::builder(Protocol::Rest, "svc").endpoint("/x").build();
    assert!(client.execute(request).await.is_ok());
}

#[tokio::test]
async fn local_rate_limiter_rejects_past_burst() {
    let transport = ScriptedTransport::new(vec![Reply::ok("ok")]);
    let mut config = single_attempt_config();
    config.rate_limit.rps = 0.001;
    config.rate_limit.burst = 2;
    let client = Client::rest()
        .config(config)
        .transport(Arc::clone(&transport) as Arc<dyn crossbar_client::Transport>)
        .build()
        .unwrap();

    for _ in 0..2 {
        let request = Request::builder(Protocol::Rest, "svc").endpoint("/x").build();
        assert!(client.execute(request).await.is_ok());
    }
    let request = Request::builder(Protocol::Rest, "svc").endpoint("/x").build();
    let error = client.execute(request).await.unwrap_err();
    assert!(matches!(error, ServiceError::RateLimit { .. }));
    // The limiter sits before the transport gate.
    assert_eq!(transport.invocations(), 2);
}

#[tokio::test]
async fn bulkhead_slot_is_released_on_error_paths() {
    let transport = ScriptedTransport::new(vec![Reply::Io("refused")]);
    let mut config = single_attempt_config();
    config.bulkhead.max_concurrent = 1;
    config.bulkhead.max_wait_ms = 20;
    let client = Client::rest()
        .config(config)
        .transport(Arc::clone(&transport) as Arc<dyn crossbar_client::Transport>)
        .build()
        .unwrap();

    // Sequential failures must each get the single slot.
    for _ in 0..5 {
        let request = Request::builder(Protocol::Rest, "svc").endpoint("/x").build();
        let error = client.execute(request).await.unwrap_err();
        assert!(matches!(error, ServiceError::Connection { .. }));
    }
    let snapshot = client.service_snapshot("svc").unwrap();
    assert_eq!(snapshot.bulkhead.in_flight, 0);
    assert_eq!(transport.invocations(), 5);
}

#[tokio::test]
async fn cancelled_attempts_are_not_recorded_by_the_breaker() {
    let transport =
        ScriptedTransport::with_delay(vec![Reply::ok("late")], Duration::from_millis(300));
    let client = Client::rest()
        .config(single_attempt_config())
        .transport(Arc::clone(&transport) as Arc<dyn crossbar_client::Transport>)
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let request = Request::builder(Protocol::Rest, "svc").endpoint("/x").build();
    let call = {
        let client = client.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { client.execute_with_cancel(request, cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();

    let error = call.await.unwrap().unwrap_err();
    assert!(error.to_string().contains("cancelled"));

    let snapshot = client.service_snapshot("svc").unwrap();
    assert_eq!(snapshot.circuit.total_calls, 0);
    assert_eq!(snapshot.bulkhead.in_flight, 0);
}

#[tokio::test(start_paused = true)]
async fn load_shedding_rejects_before_any_other_gate() {
    struct Saturated;
    impl ProcessStatsSource for Saturated {
        fn sample(&self) -> ProcessSample {
            ProcessSample {
                cpu: 1.0,
                cores: 8,
                ..ProcessSample::default()
            }
        }
    }

    let transport = ScriptedTransport::new(vec![Reply::ok("ok")]);
    let client = Client::rest()
        .config(single_attempt_config())
        .transport(Arc::clone(&transport) as Arc<dyn crossbar_client::Transport>)
        .stats_source(Arc::new(Saturated))
        .build()
        .unwrap();

    let request = Request::builder(Protocol::Rest, "svc").endpoint("/x").build();
    let error = client.execute(request).await.unwrap_err();
    assert!(matches!(error, ServiceError::LoadShed { .. }));
    assert_eq!(error.suggested_delay(), Some(Duration::from_secs(3)));
    assert_eq!(transport.invocations(), 0);
    // Shed before the policies were even created for the service.
    assert!(client.service_snapshot("svc").is_none());
}

#[tokio::test]
async fn post_phase_interceptors_observe_mapped_errors() {
    use parking_lot::Mutex;

    struct Observer {
        seen: Arc<Mutex<Vec<String>>>,
    }
    impl Interceptor for Observer {
        fn intercept(&self, request: Request, next: Next) -> InterceptFuture {
            let seen = Arc::clone(&self.seen);
            Box::pin(async move {
                let result = next.run(request).await;
                if let Err(error) = &result {
                    seen.lock().push(error.kind_name().to_string());
                }
                result
            })
        }
    }

    let seen = Arc::new(Mutex::new(Vec::new()));
    let transport = ScriptedTransport::new(vec![Reply::status(404, "{}")]);
    let client = Client::rest()
        .config(single_attempt_config())
        .transport(transport)
        .interceptor(Observer {
            seen: Arc::clone(&seen),
        })
        .build()
        .unwrap();

    let request = Request::builder(Protocol::Rest, "svc").endpoint("/x").build();
    let _ = client.execute(request).await;
    assert_eq!(*seen.lock(), vec!["not_found".to_string()]);
}
