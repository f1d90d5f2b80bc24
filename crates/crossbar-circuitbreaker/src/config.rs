use crate::circuit::{CircuitBreaker, CircuitState};
use crate::events::CircuitBreakerEvent;
use crossbar_core::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for one circuit breaker instance.
pub struct CircuitBreakerConfig {
    pub(crate) failure_rate_threshold: f64,
    pub(crate) sliding_window_size: usize,
    pub(crate) minimum_number_of_calls: usize,
    pub(crate) wait_duration_in_open: Duration,
    pub(crate) permitted_probes: usize,
    pub(crate) slow_call_threshold: Option<Duration>,
    pub(crate) events: EventListeners<CircuitBreakerEvent>,
    pub(crate) name: String,
}

impl CircuitBreakerConfig {
    pub fn builder() -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new()
    }

    /// Preset: balanced defaults for most services.
    pub fn standard() -> CircuitBreakerConfigBuilder {
        Self::builder()
            .failure_rate_threshold(0.5)
            .sliding_window_size(100)
            .wait_duration_in_open(Duration::from_secs(30))
            .permitted_probes(3)
    }

    /// Preset: opens quickly for latency-sensitive callers.
    pub fn fast_fail() -> CircuitBreakerConfigBuilder {
        Self::builder()
            .failure_rate_threshold(0.25)
            .sliding_window_size(20)
            .wait_duration_in_open(Duration::from_secs(10))
            .permitted_probes(1)
    }

    /// Preset: tolerates transient bursts of failures.
    pub fn tolerant() -> CircuitBreakerConfigBuilder {
        Self::builder()
            .failure_rate_threshold(0.75)
            .sliding_window_size(200)
            .wait_duration_in_open(Duration::from_secs(60))
            .permitted_probes(5)
    }
}

/// Builder for [`CircuitBreakerConfig`].
pub struct CircuitBreakerConfigBuilder {
    failure_rate_threshold: f64,
    sliding_window_size: usize,
    minimum_number_of_calls: Option<usize>,
    wait_duration_in_open: Duration,
    permitted_probes: usize,
    slow_call_threshold: Option<Duration>,
    events: EventListeners<CircuitBreakerEvent>,
    name: String,
}

impl CircuitBreakerConfigBuilder {
    pub fn new() -> Self {
        Self {
            failure_rate_threshold: 0.5,
            sliding_window_size: 20,
            minimum_number_of_calls: None,
            wait_duration_in_open: Duration::from_secs(30),
            permitted_probes: 1,
            slow_call_threshold: None,
            events: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Failure rate (0.0–1.0) at which the circuit opens.
    ///
    /// Default: 0.5
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate.clamp(0.0, 1.0);
        self
    }

    /// Number of recent calls tracked in the ring buffer.
    ///
    /// Default: 20
    pub fn sliding_window_size(mut self, size: usize) -> Self {
        self.sliding_window_size = size.max(1);
        self
    }

    /// In-window calls required before the failure rate is evaluated.
    ///
    /// Default: same as the window size.
    pub fn minimum_number_of_calls(mut self, n: usize) -> Self {
        self.minimum_number_of_calls = Some(n.max(1));
        self
    }

    /// How long the circuit stays open before probing.
    ///
    /// Default: 30 seconds
    pub fn wait_duration_in_open(mut self, duration: Duration) -> Self {
        self.wait_duration_in_open = duration;
        self
    }

    /// Concurrent probe calls admitted while half-open.
    ///
    /// Default: 1
    pub fn permitted_probes(mut self, n: usize) -> Self {
        self.permitted_probes = n.max(1);
        self
    }

    /// Duration above which a successful call counts as slow. Slow calls
    /// contribute to the failure rate only when this is set.
    ///
    /// Default: disabled
    pub fn slow_call_threshold(mut self, duration: Duration) -> Self {
        self.slow_call_threshold = Some(duration);
        self
    }

    /// Names the breaker for logs, metrics and events.
    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Callback on every state transition.
    pub fn on_state_transition<F>(mut self, f: F) -> Self
    where
        F: Fn(CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.events
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::StateTransition {
                    from_state,
                    to_state,
                    ..
                } = event
                {
                    f(*from_state, *to_state);
                }
            }));
        self
    }

    /// Callback whenever the gate rejects a call.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if matches!(event, CircuitBreakerEvent::CallRejected { .. }) {
                    f();
                }
            }));
        self
    }

    /// Callback on each recorded slow call.
    pub fn on_slow_call<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.events
            .add(FnListener::new(move |event: &CircuitBreakerEvent| {
                if let CircuitBreakerEvent::SlowCallDetected { duration, .. } = event {
                    f(*duration);
                }
            }));
        self
    }

    pub fn build(self) -> Arc<CircuitBreaker> {
        let minimum = self
            .minimum_number_of_calls
            .unwrap_or(self.sliding_window_size)
            .min(self.sliding_window_size);
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_rate_threshold: self.failure_rate_threshold,
            sliding_window_size: self.sliding_window_size,
            minimum_number_of_calls: minimum,
            wait_duration_in_open: self.wait_duration_in_open,
            permitted_probes: self.permitted_probes,
            slow_call_threshold: self.slow_call_threshold,
            events: self.events,
            name: self.name,
        })
    }
}

impl Default for CircuitBreakerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
