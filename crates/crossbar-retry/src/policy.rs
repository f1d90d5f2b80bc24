use crate::events::RetryEvent;
use crossbar_core::{EventListeners, FnListener, Retryable, ServiceError};
use std::time::{Duration, Instant};

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Wait `delay`, then re-enter the pipeline.
    Retry { delay: Duration },
    /// Surface the error to the caller.
    Abort,
}

/// Retryability-driven retry policy.
///
/// Decision inputs are exactly: the error's retryability verdict, the attempt
/// index, and the caller deadline. The computed wait is
/// `min(max_backoff, max(suggested_delay, base_backoff × 2^attempt))`,
/// shrunk by up to `jitter` of itself.
#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    jitter: f64,
    events: EventListeners<RetryEvent>,
    name: String,
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether to retry after `error`, which ended attempt number
    /// `attempt` (zero-indexed). `deadline` is the caller's bound on the
    /// whole call; a wait that would cross it aborts instead.
    pub fn decide(
        &self,
        error: &ServiceError,
        attempt: u32,
        deadline: Option<Instant>,
    ) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Abort;
        }
        if attempt + 1 >= self.max_attempts {
            self.events.emit(&RetryEvent::RetriesExhausted {
                pattern_name: self.name.clone(),
                timestamp: Instant::now(),
                attempts: attempt + 1,
            });
            metrics::counter!("retry_exhausted_total", "retry" => self.name.clone()).increment(1);
            return RetryDecision::Abort;
        }

        let delay = self.delay_for(error, attempt);
        if let Some(deadline) = deadline {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < delay {
                return RetryDecision::Abort;
            }
        }

        self.events.emit(&RetryEvent::RetryScheduled {
            pattern_name: self.name.clone(),
            timestamp: Instant::now(),
            attempt: attempt + 1,
            delay,
        });
        tracing::debug!(
            retry = %self.name,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "retry scheduled"
        );
        metrics::counter!("retry_attempts_total", "retry" => self.name.clone()).increment(1);
        RetryDecision::Retry { delay }
    }

    fn delay_for(&self, error: &ServiceError, attempt: u32) -> Duration {
        use rand::Rng;
        let exponential = self
            .base_backoff
            .mul_f64(2f64.powi(attempt.min(31) as i32));
        let floored = match error.suggested_delay() {
            Some(suggested) => exponential.max(suggested),
            None => exponential,
        };
        let capped = floored.min(self.max_backoff);
        if self.jitter > 0.0 {
            let shrink: f64 = rand::thread_rng().gen::<f64>() * self.jitter;
            capped.mul_f64(1.0 - shrink)
        } else {
            capped
        }
    }
}

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    base_backoff: Duration,
    max_backoff: Duration,
    jitter: f64,
    events: EventListeners<RetryEvent>,
    name: String,
}

impl RetryPolicyBuilder {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            jitter: 0.1,
            events: EventListeners::new(),
            name: String::from("<unnamed>"),
        }
    }

    /// Attempts in total, the initial call included.
    ///
    /// Default: 3
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n.max(1);
        self
    }

    /// Backoff before the first retry; doubles per attempt.
    ///
    /// Default: 500 ms
    pub fn base_backoff(mut self, base: Duration) -> Self {
        self.base_backoff = base;
        self
    }

    /// Cap on any single wait.
    ///
    /// Default: 30 seconds
    pub fn max_backoff(mut self, max: Duration) -> Self {
        self.max_backoff = max;
        self
    }

    /// Jitter fraction in `[0, 1)`; each wait is shrunk by up to this share
    /// of itself.
    ///
    /// Default: 0.1
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 0.999);
        self
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    /// Callback on each scheduled retry with the attempt number and wait.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.events.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::RetryScheduled { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Callback when the attempt budget runs out.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.events.add(FnListener::new(move |event: &RetryEvent| {
            if let RetryEvent::RetriesExhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: self.base_backoff,
            max_backoff: self.max_backoff,
            jitter: self.jitter,
            events: self.events,
            name: self.name,
        }
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}
