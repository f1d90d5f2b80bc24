//! Interceptor chain and built-in interceptors.
//!
//! An interceptor sees the request before the transport does and the outcome
//! after; it may rewrite the request, observe, short-circuit with a synthetic
//! response, or fail. The chain is a linear, index-threaded sequence: each
//! [`Next`] owns the position of the remaining tail, so an interceptor can
//! only ever move forward.
//!
//! Registration happens once at client build time; ordering is by integer
//! priority, lower first, ties kept in registration order.
//!
//! ```
//! use crossbar_interceptor::{Interceptor, InterceptFuture, Next};
//! use crossbar_core::Request;
//!
//! struct Tenant;
//!
//! impl Interceptor for Tenant {
//!     fn priority(&self) -> i32 { 10 }
//!     fn intercept(&self, request: Request, next: Next) -> InterceptFuture {
//!         next.run(request.with_header("x-tenant", "acme"))
//!     }
//! }
//! ```

mod cache;
mod chain;
mod chaos;
mod logging;
mod telemetry;

pub use cache::{CacheInterceptor, CacheInterceptorBuilder};
pub use chain::{InterceptFuture, Interceptor, InterceptorChain, Next, Terminal};
pub use chaos::{ChaosInterceptor, ChaosInterceptorBuilder};
pub use logging::{LoggingInterceptor, Verbosity};
pub use telemetry::TelemetryInterceptor;
