use crate::chain::{InterceptFuture, Interceptor, Next};
use crossbar_core::{ErrorContext, Request, Response, ServiceError};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};

/// Probabilistic fault injection for resilience testing.
///
/// Disabled by default, and refuses to arm itself when `CROSSBAR_ENV` is set
/// to `production` regardless of configuration.
pub struct ChaosInterceptor {
    error_rate: f64,
    latency_rate: f64,
    min_latency: Duration,
    max_latency: Duration,
    corruption_rate: f64,
    enabled: bool,
    rng: Mutex<StdRng>,
    priority: i32,
}

impl ChaosInterceptor {
    pub fn builder() -> ChaosInterceptorBuilder {
        ChaosInterceptorBuilder::new()
    }

    fn roll(&self) -> f64 {
        self.rng.lock().gen()
    }

    fn injected_error(&self, request: &Request) -> ServiceError {
        let context = ErrorContext::builder(request.service(), request.endpoint())
            .method(request.method())
            .protocol(request.protocol())
            .request_id(request.request_id())
            .build();
        ServiceError::InternalError {
            context: Box::new(context),
            message: "chaos: injected failure".into(),
        }
    }

}

impl Interceptor for ChaosInterceptor {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &str {
        "chaos"
    }

    fn intercept(&self, request: Request, next: Next) -> InterceptFuture {
        if !self.enabled {
            return next.run(request);
        }

        let service = request.service().to_string();

        if self.error_rate > 0.0 && self.roll() < self.error_rate {
            tracing::warn!(%service, "chaos: error injected");
            metrics::counter!("chaos_errors_injected_total", "service" => service).increment(1);
            let error = self.injected_error(&request);
            return Box::pin(async move { Err(error) });
        }

        let latency = if self.latency_rate > 0.0 && self.roll() < self.latency_rate {
            let min_ms = self.min_latency.as_millis() as u64;
            let max_ms = self.max_latency.as_millis() as u64;
            let delay_ms = if max_ms > min_ms {
                self.rng.lock().gen_range(min_ms..=max_ms)
            } else {
                min_ms
            };
            Some(Duration::from_millis(delay_ms))
        } else {
            None
        };

        let corrupt = self.corruption_rate > 0.0 && self.roll() < self.corruption_rate;
        let rng_seed: u64 = self.rng.lock().gen();

        Box::pin(async move {
            if let Some(delay) = latency {
                tracing::debug!(%service, delay_ms = delay.as_millis() as u64, "chaos: latency injected");
                metrics::counter!("chaos_latency_injections_total", "service" => service.clone())
                    .increment(1);
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();
            let result = next.run(request).await;

            match result {
                Ok(response) if corrupt => {
                    metrics::counter!("chaos_corruptions_total", "service" => service).increment(1);
                    let mut rng = StdRng::seed_from_u64(rng_seed);
                    let mut bytes = response.body().to_vec();
                    for byte in bytes.iter_mut() {
                        if rng.gen::<f64>() < 0.25 {
                            *byte = rng.gen();
                        }
                    }
                    Ok(Response::new(
                        response.status(),
                        bytes,
                        response.headers().clone(),
                        start.elapsed(),
                    )
                    .with_attribute("chaos.corrupted", true))
                }
                other => other,
            }
        })
    }
}

/// Builder for [`ChaosInterceptor`].
pub struct ChaosInterceptorBuilder {
    error_rate: f64,
    latency_rate: f64,
    min_latency: Duration,
    max_latency: Duration,
    corruption_rate: f64,
    enabled: bool,
    seed: Option<u64>,
    priority: i32,
}

impl ChaosInterceptorBuilder {
    pub fn new() -> Self {
        Self {
            error_rate: 0.0,
            latency_rate: 0.0,
            min_latency: Duration::from_millis(50),
            max_latency: Duration::from_millis(500),
            corruption_rate: 0.0,
            enabled: false,
            seed: None,
            priority: 50,
        }
    }

    /// Probability in `[0, 1]` of failing the call outright.
    pub fn error_rate(mut self, rate: f64) -> Self {
        self.error_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Probability in `[0, 1]` of delaying the call.
    pub fn latency_rate(mut self, rate: f64) -> Self {
        self.latency_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Injected latency band.
    pub fn latency_band(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max.max(min);
        self
    }

    /// Probability in `[0, 1]` of corrupting a successful response body.
    pub fn corruption_rate(mut self, rate: f64) -> Self {
        self.corruption_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Arms the interceptor. Ignored in production environments.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Deterministic randomness for tests.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn build(self) -> ChaosInterceptor {
        let production = std::env::var("CROSSBAR_ENV")
            .map(|env| env.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let enabled = if self.enabled && production {
            tracing::warn!("chaos injection requested in production environment; forced off");
            false
        } else {
            self.enabled
        };
        ChaosInterceptor {
            error_rate: self.error_rate,
            latency_rate: self.latency_rate,
            min_latency: self.min_latency,
            max_latency: self.max_latency,
            corruption_rate: self.corruption_rate,
            enabled,
            rng: Mutex::new(match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            }),
            priority: self.priority,
        }
    }
}

impl Default for ChaosInterceptorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
