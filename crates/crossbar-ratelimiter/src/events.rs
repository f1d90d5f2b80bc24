use crossbar_core::ResilienceEvent;
use std::time::Instant;

/// Events emitted by a rate limiter.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    Permitted {
        pattern_name: String,
        timestamp: Instant,
    },
    Rejected {
        pattern_name: String,
        timestamp: Instant,
    },
}

impl ResilienceEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::Permitted { .. } => "permitted",
            RateLimiterEvent::Rejected { .. } => "rejected",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::Permitted { timestamp, .. }
            | RateLimiterEvent::Rejected { timestamp, .. } => *timestamp,
        }
    }

    fn pattern_name(&self) -> &str {
        match self {
            RateLimiterEvent::Permitted { pattern_name, .. }
            | RateLimiterEvent::Rejected { pattern_name, .. } => pattern_name,
        }
    }
}
