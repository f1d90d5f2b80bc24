use crate::events::RateLimiterEvent;
use crate::{RateLimiter, Shared};
use crossbar_core::{EventListeners, FnListener};
use std::sync::Arc;

/// Configuration entry point for [`RateLimiter`].
pub struct RateLimiterConfig;

impl RateLimiterConfig {
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterConfigBuilder {
    requests_per_second: f64,
    burst_capacity: usize,
    events: EventListeners<RateLimiterEvent>,
    name: String,
}

impl RateLimiterConfigBuilder {
    pub fn new() -> Self {
        Self {
            requests_per_second: 50.0,
            burst_capacity: 50,
            events: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Steady-state refill rate.
    ///
    /// Default: 50 req/s
    pub fn requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = rps.max(0.0);
        self
    }

    /// Bucket capacity; the largest instantaneous burst admitted.
    ///
    /// Default: 50
    pub fn burst_capacity(mut self, burst: usize) -> Self {
        self.burst_capacity = burst.max(1);
        self
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Callback on each refused acquire.
    pub fn on_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events
            .add(FnListener::new(move |event: &RateLimiterEvent| {
                if matches!(event, RateLimiterEvent::Rejected { .. }) {
                    f();
                }
            }));
        self
    }

    pub fn build(self) -> Arc<RateLimiter> {
        RateLimiter::new(Shared {
            requests_per_second: self.requests_per_second,
            burst_capacity: self.burst_capacity,
            events: self.events,
            name: self.name,
        })
    }
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
