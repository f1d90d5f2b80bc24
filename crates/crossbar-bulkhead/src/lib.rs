//! Bounded concurrent-in-flight isolation per service.
//!
//! A bulkhead caps how many calls to one service may be in flight at once.
//! Acquire waits up to `max_wait`; past that the call fails fast so a slow
//! dependency cannot absorb every caller task. Release is unconditional:
//! the permit is an owned guard returned to the semaphore on drop, on every
//! exit path including cancellation.
//!
//! ```
//! use crossbar_bulkhead::BulkheadConfig;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let bulkhead = BulkheadConfig::builder()
//!     .max_concurrent(16)
//!     .max_wait(Duration::from_millis(50))
//!     .name("billing")
//!     .build();
//!
//! match bulkhead.acquire().await {
//!     Ok(_permit) => { /* in-flight slot held until drop */ }
//!     Err(full) => { let _ = full; }
//! }
//! # }
//! ```

mod config;
mod events;

pub use config::{BulkheadConfig, BulkheadConfigBuilder};
pub use events::BulkheadEvent;

use crossbar_core::EventListeners;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Rejection when no slot frees up within the wait bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("bulkhead full: {max_concurrent} calls in flight")]
pub struct BulkheadFull {
    pub max_concurrent: usize,
}

/// Point-in-time view for the observability surface.
#[derive(Debug, Clone, Serialize)]
pub struct BulkheadSnapshot {
    pub capacity: usize,
    pub in_flight: usize,
    pub waiting: usize,
}

pub(crate) struct Shared {
    pub(crate) max_concurrent: usize,
    pub(crate) max_wait: Option<std::time::Duration>,
    pub(crate) events: EventListeners<BulkheadEvent>,
    pub(crate) name: String,
}

/// The bulkhead itself. Shared across calls via `Arc`.
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    waiting: AtomicUsize,
    shared: Shared,
}

/// An in-flight slot. The slot returns to the bulkhead when this drops.
#[derive(Debug)]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
}

impl Bulkhead {
    pub(crate) fn new(shared: Shared) -> Arc<Self> {
        Arc::new(Self {
            semaphore: Arc::new(Semaphore::new(shared.max_concurrent)),
            waiting: AtomicUsize::new(0),
            shared,
        })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Waits for an in-flight slot, up to the configured bound.
    pub async fn acquire(&self) -> Result<BulkheadPermit, BulkheadFull> {
        let semaphore = Arc::clone(&self.semaphore);
        self.waiting.fetch_add(1, Ordering::AcqRel);
        let acquired = match self.shared.max_wait {
            Some(wait) => match tokio::time::timeout(wait, semaphore.acquire_owned()).await {
                Ok(result) => result.ok(),
                Err(_) => None,
            },
            None => semaphore.acquire_owned().await.ok(),
        };
        self.waiting.fetch_sub(1, Ordering::AcqRel);

        match acquired {
            Some(permit) => {
                let in_flight =
                    self.shared.max_concurrent - self.semaphore.available_permits();
                self.shared.events.emit(&BulkheadEvent::CallPermitted {
                    pattern_name: self.shared.name.clone(),
                    timestamp: Instant::now(),
                    concurrent_calls: in_flight,
                });
                metrics::counter!("bulkhead_calls_permitted_total", "bulkhead" => self.shared.name.clone())
                    .increment(1);
                metrics::gauge!("bulkhead_concurrent_calls", "bulkhead" => self.shared.name.clone())
                    .set(in_flight as f64);
                Ok(BulkheadPermit { _permit: permit })
            }
            None => {
                self.shared.events.emit(&BulkheadEvent::CallRejected {
                    pattern_name: self.shared.name.clone(),
                    timestamp: Instant::now(),
                    max_concurrent_calls: self.shared.max_concurrent,
                });
                tracing::debug!(bulkhead = %self.shared.name, "bulkhead acquire timed out");
                metrics::counter!("bulkhead_calls_rejected_total", "bulkhead" => self.shared.name.clone())
                    .increment(1);
                Err(BulkheadFull {
                    max_concurrent: self.shared.max_concurrent,
                })
            }
        }
    }

    pub fn snapshot(&self) -> BulkheadSnapshot {
        let available = self.semaphore.available_permits();
        BulkheadSnapshot {
            capacity: self.shared.max_concurrent,
            in_flight: self.shared.max_concurrent.saturating_sub(available),
            waiting: self.waiting.load(Ordering::Acquire),
        }
    }
}
