//! Per-service circuit breaker.
//!
//! A three-state machine (closed, open, half-open) over a count-based sliding
//! window of recent call outcomes. The gate is non-blocking: callers either
//! receive a [`CircuitPermit`] to record the outcome against, or an
//! [`OpenRejection`] telling them how long the circuit stays open.
//!
//! The breaker is local to the process. It never blocks, never retries, and
//! never consults another instance.
//!
//! ```
//! use crossbar_circuitbreaker::CircuitBreakerConfig;
//! use std::time::Duration;
//!
//! let breaker = CircuitBreakerConfig::builder()
//!     .failure_rate_threshold(0.5)
//!     .sliding_window_size(20)
//!     .wait_duration_in_open(Duration::from_secs(30))
//!     .name("billing")
//!     .build();
//!
//! match breaker.try_acquire() {
//!     Ok(permit) => {
//!         // ... call downstream ...
//!         permit.record_success(Duration::from_millis(12));
//!     }
//!     Err(rejection) => {
//!         // fail fast; rejection.retry_in hints when to come back
//!         let _ = rejection;
//!     }
//! }
//! ```

mod circuit;
mod config;
mod events;

pub use circuit::{
    CallOutcome, CircuitBreaker, CircuitPermit, CircuitSnapshot, CircuitState, OpenRejection,
};
pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use events::CircuitBreakerEvent;
