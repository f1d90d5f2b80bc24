use crate::events::BulkheadEvent;
use crate::{Bulkhead, Shared};
use crossbar_core::{EventListeners, FnListener};
use std::sync::Arc;
use std::time::Duration;

/// Configuration entry point for [`Bulkhead`].
pub struct BulkheadConfig;

impl BulkheadConfig {
    pub fn builder() -> BulkheadConfigBuilder {
        BulkheadConfigBuilder::new()
    }
}

/// Builder for [`Bulkhead`].
pub struct BulkheadConfigBuilder {
    max_concurrent: usize,
    max_wait: Option<Duration>,
    events: EventListeners<BulkheadEvent>,
    name: String,
}

impl BulkheadConfigBuilder {
    pub fn new() -> Self {
        Self {
            max_concurrent: 25,
            max_wait: None,
            events: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Maximum calls in flight at once.
    ///
    /// Default: 25
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    /// Longest an acquire may wait for a slot before failing fast.
    ///
    /// Default: wait indefinitely
    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.max_wait = Some(wait);
        self
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Callback whenever a call is rejected for want of a slot.
    pub fn on_call_rejected<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.events.add(FnListener::new(move |event: &BulkheadEvent| {
            if matches!(event, BulkheadEvent::CallRejected { .. }) {
                f();
            }
        }));
        self
    }

    /// Callback with the in-flight count on each admitted call.
    pub fn on_call_permitted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.events.add(FnListener::new(move |event: &BulkheadEvent| {
            if let BulkheadEvent::CallPermitted {
                concurrent_calls, ..
            } = event
            {
                f(*concurrent_calls);
            }
        }));
        self
    }

    pub fn build(self) -> Arc<Bulkhead> {
        Bulkhead::new(Shared {
            max_concurrent: self.max_concurrent,
            max_wait: self.max_wait,
            events: self.events,
            name: self.name,
        })
    }
}

impl Default for BulkheadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
