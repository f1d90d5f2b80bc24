//! The execution pipeline and client surface.
//!
//! A [`Client`] turns a [`Request`](crossbar_core::Request) into a
//! [`Response`](crossbar_core::Response) or a typed
//! [`ServiceError`](crossbar_core::ServiceError), applying a fixed gate order
//! around every attempt:
//!
//! 1. interceptors (pre phase)
//! 2. load-shed admission check
//! 3. rate limiter `try_acquire`
//! 4. bulkhead acquire with bounded wait
//! 5. circuit breaker gate
//! 6. adaptive per-attempt deadline
//! 7. transport invocation under timeout and cancellation
//! 8. error mapping, outcome recording, interceptors (post phase)
//! 9. retry decision, backoff, re-entry at step 1
//!
//! Per-service policies are created lazily at first use and live in a
//! process-wide registry for the client's lifetime. The transport stays
//! opaque: the pipeline hands it a prepared request, a deadline and a
//! cancellation token, and receives bytes or a mapped status back.

mod client;
mod config;
mod pipeline;
mod registry;
mod stream;
mod transport;

pub use client::{Client, ClientBuilder};
pub use config::{
    BulkheadSection, CacheSection, CircuitSection, CrossbarConfig, LoadShedSection, OAuthSection,
    RateLimitSection, RetrySection, TimeoutSection, UploadSection, WsSection,
};
pub use registry::{PolicyRegistry, ServicePolicies, ServiceSnapshot};
pub use stream::StreamHandle;
pub use transport::{RawResponse, RawStream, ServiceTransport, StreamItem, Transport, TransportError};
