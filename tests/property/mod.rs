pub mod adaptive_timeout;
pub mod bulkhead;
pub mod errors;
pub mod rate_limiter;
pub mod retry;
