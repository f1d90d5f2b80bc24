//! Retry policy and backoff intervals.
//!
//! The policy consults nothing about an error except its retryability
//! verdict: [`Retryable::is_retryable`] decides whether a retry is allowed at
//! all, and [`Retryable::suggested_delay`] puts a floor under the computed
//! exponential backoff. Categories and messages play no part here.
//!
//! The [`IntervalFunction`] family is also used standalone by components that
//! schedule their own waits (WebSocket reconnects, upload chunk retries).

mod backoff;
mod events;
mod policy;

pub use backoff::{
    ExponentialBackoff, ExponentialRandomBackoff, FixedInterval, FnInterval, IntervalFunction,
};
pub use events::RetryEvent;
pub use policy::{RetryDecision, RetryPolicy, RetryPolicyBuilder};
