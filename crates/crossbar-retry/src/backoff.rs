use std::sync::Arc;
use std::time::Duration;

/// Computes the wait before a retry attempt.
///
/// `attempt` is zero-indexed: the wait before the first retry is
/// `next_interval(0)`.
pub trait IntervalFunction: Send + Sync {
    fn next_interval(&self, attempt: usize) -> Duration;
}

impl IntervalFunction for Arc<dyn IntervalFunction> {
    fn next_interval(&self, attempt: usize) -> Duration {
        (**self).next_interval(attempt)
    }
}

/// The same wait every time.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl IntervalFunction for FixedInterval {
    fn next_interval(&self, _attempt: usize) -> Duration {
        self.interval
    }
}

/// Geometric growth from an initial wait, optionally capped.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    multiplier: f64,
    cap: Option<Duration>,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration) -> Self {
        Self {
            initial,
            multiplier: 2.0,
            cap: None,
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn max_interval(mut self, cap: Duration) -> Self {
        self.cap = Some(cap);
        self
    }
}

impl IntervalFunction for ExponentialBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        // Exponent is clamped so a long outage cannot overflow Duration.
        let factor = self.multiplier.powi(attempt.min(32) as i32);
        let grown = self.initial.mul_f64(factor);
        match self.cap {
            Some(cap) => grown.min(cap),
            None => grown,
        }
    }
}

/// Exponential growth with a randomization band, so a herd of failing
/// callers does not retry in lockstep.
#[derive(Debug, Clone)]
pub struct ExponentialRandomBackoff {
    base: ExponentialBackoff,
    randomization: f64,
}

impl ExponentialRandomBackoff {
    /// `randomization` in `[0, 1]`: 0.5 spreads each wait between 50% and
    /// 150% of the computed value.
    pub fn new(initial: Duration, randomization: f64) -> Self {
        Self {
            base: ExponentialBackoff::new(initial),
            randomization: randomization.clamp(0.0, 1.0),
        }
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.base = self.base.multiplier(multiplier);
        self
    }

    pub fn max_interval(mut self, cap: Duration) -> Self {
        self.base = self.base.max_interval(cap);
        self
    }
}

impl IntervalFunction for ExponentialRandomBackoff {
    fn next_interval(&self, attempt: usize) -> Duration {
        use rand::Rng;
        let computed = self.base.next_interval(attempt).as_secs_f64();
        let delta = computed * self.randomization;
        let sampled = rand::thread_rng().gen_range((computed - delta)..=(computed + delta));
        Duration::from_secs_f64(sampled.max(0.0))
    }
}

/// A closure as an interval function.
pub struct FnInterval<F> {
    f: F,
}

impl<F> FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> IntervalFunction for FnInterval<F>
where
    F: Fn(usize) -> Duration + Send + Sync,
{
    fn next_interval(&self, attempt: usize) -> Duration {
        (self.f)(attempt)
    }
}
