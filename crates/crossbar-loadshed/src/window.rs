use std::time::{Duration, Instant};

/// Rolling window length per service.
const WINDOW: Duration = Duration::from_secs(60);
/// Floor on the rps denominator, so a window a few milliseconds old does not
/// inflate the observed rate.
const MIN_WINDOW_SECS: f64 = 1.0;

/// Per-service traffic counters over the current window.
#[derive(Debug)]
pub(crate) struct ServiceWindow {
    pub(crate) start: Instant,
    pub(crate) arrivals: u64,
    pub(crate) responses: u64,
    pub(crate) latency_sum: Duration,
    pub(crate) errors: u64,
}

impl ServiceWindow {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            arrivals: 0,
            responses: 0,
            latency_sum: Duration::ZERO,
            errors: 0,
        }
    }

    pub(crate) fn roll_if_stale(&mut self) {
        if self.start.elapsed() >= WINDOW {
            *self = Self::new();
        }
    }

    pub(crate) fn rps(&self) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64().max(MIN_WINDOW_SECS);
        self.arrivals as f64 / elapsed
    }

    pub(crate) fn mean_latency(&self) -> Option<Duration> {
        if self.responses == 0 {
            None
        } else {
            Some(self.latency_sum / self.responses as u32)
        }
    }

    pub(crate) fn error_rate(&self) -> f64 {
        if self.responses == 0 {
            0.0
        } else {
            self.errors as f64 / self.responses as f64
        }
    }
}
