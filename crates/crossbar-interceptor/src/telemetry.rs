use crate::chain::{InterceptFuture, Interceptor, Next};
use crossbar_core::Request;
use std::time::Instant;

/// Response-time bucket upper bounds, in milliseconds.
const LATENCY_BUCKETS_MS: &[u64] = &[10, 50, 100, 500, 1000, 5000, 10000];

/// Counts requests, successes and errors, and records response-time
/// distributions per service.
pub struct TelemetryInterceptor {
    priority: i32,
}

impl TelemetryInterceptor {
    pub fn new() -> Self {
        Self { priority: -50 }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn bucket_label(elapsed_ms: u64) -> &'static str {
        for (bound, label) in LATENCY_BUCKETS_MS.iter().zip([
            "10", "50", "100", "500", "1000", "5000", "10000",
        ]) {
            if elapsed_ms <= *bound {
                return label;
            }
        }
        "+Inf"
    }
}

impl Default for TelemetryInterceptor {
    fn default() -> Self {
        Self::new()
    }
}

impl Interceptor for TelemetryInterceptor {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &str {
        "telemetry"
    }

    fn intercept(&self, request: Request, next: Next) -> InterceptFuture {
        let service = request.service().to_string();
        metrics::counter!("client_requests_total", "service" => service.clone()).increment(1);

        Box::pin(async move {
            let start = Instant::now();
            let result = next.run(request).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;

            metrics::counter!(
                "client_response_time_bucket",
                "service" => service.clone(),
                "le" => Self::bucket_label(elapsed_ms)
            )
            .increment(1);
            metrics::histogram!("client_response_time_ms", "service" => service.clone())
                .record(elapsed_ms as f64);

            match &result {
                Ok(_) => {
                    metrics::counter!("client_successes_total", "service" => service).increment(1);
                }
                Err(error) => {
                    metrics::counter!(
                        "client_errors_total",
                        "service" => service,
                        "kind" => error.kind_name()
                    )
                    .increment(1);
                }
            }
            result
        })
    }
}
