use crate::context::ErrorContext;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Coarse error class used for observability and user-surfaced messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    Validation,
    Auth,
    Client,
    Server,
    Network,
    Timeout,
    RateLimit,
    Circuit,
    Serialization,
    Config,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Auth => "auth",
            ErrorCategory::Client => "client",
            ErrorCategory::Server => "server",
            ErrorCategory::Network => "network",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::RateLimit => "rate-limit",
            ErrorCategory::Circuit => "circuit",
            ErrorCategory::Serialization => "serialization",
            ErrorCategory::Config => "config",
            ErrorCategory::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// One field-level validation failure, as extracted from a 422 body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Retryability verdict the retry policy consults.
///
/// The policy looks at nothing else on the error: variant identity determines
/// the boolean, and the suggested delay is a floor under the computed backoff.
pub trait Retryable {
    fn is_retryable(&self) -> bool;

    /// Minimum delay a retry should wait, when the variant suggests one.
    fn suggested_delay(&self) -> Option<Duration>;
}

/// Terminal error of a service call.
///
/// Every failure path in the pipeline ends in exactly one of these variants;
/// each carries the [`ErrorContext`] built on the failure path. The `Display`
/// form is the enriched message: cause text followed by service, endpoint,
/// status, request id, elapsed time and retry attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Request rejected by the server as malformed (HTTP 400 and friends).
    Validation {
        context: Box<ErrorContext>,
        message: String,
    },
    /// Semantically invalid request with field-level detail (HTTP 422).
    Unprocessable {
        context: Box<ErrorContext>,
        message: String,
        field_errors: Vec<FieldError>,
    },
    /// Missing or insufficient credentials (HTTP 401/403).
    Authentication {
        context: Box<ErrorContext>,
        message: String,
    },
    NotFound {
        context: Box<ErrorContext>,
        message: String,
    },
    Conflict {
        context: Box<ErrorContext>,
        message: String,
    },
    /// The attempt exceeded its per-attempt deadline.
    Timeout {
        context: Box<ErrorContext>,
        message: String,
    },
    /// Server-side throttling (HTTP 429, gRPC RESOURCE_EXHAUSTED) or local
    /// rate-limiter rejection.
    RateLimit {
        context: Box<ErrorContext>,
        message: String,
        retry_after: Option<Duration>,
    },
    InternalError {
        context: Box<ErrorContext>,
        message: String,
    },
    TemporarilyUnavailable {
        context: Box<ErrorContext>,
        message: String,
    },
    /// Transport-level I/O failure before a response arrived.
    Connection {
        context: Box<ErrorContext>,
        message: String,
    },
    Serialization {
        context: Box<ErrorContext>,
        message: String,
    },
    CircuitBreakerOpen {
        context: Box<ErrorContext>,
    },
    BulkheadFull {
        context: Box<ErrorContext>,
    },
    LoadShed {
        context: Box<ErrorContext>,
        reason: String,
    },
    Configuration {
        context: Box<ErrorContext>,
        message: String,
    },
    SoapFault {
        context: Box<ErrorContext>,
        fault_code: String,
        fault_string: String,
        /// True when the fault code names the receiver/server side.
        server_fault: bool,
    },
    Unknown {
        context: Box<ErrorContext>,
        message: String,
    },
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::Validation { .. } | ServiceError::Unprocessable { .. } => {
                ErrorCategory::Validation
            }
            ServiceError::Authentication { .. } => ErrorCategory::Auth,
            ServiceError::NotFound { .. } | ServiceError::Conflict { .. } => ErrorCategory::Client,
            ServiceError::Timeout { .. } => ErrorCategory::Timeout,
            ServiceError::RateLimit { .. } | ServiceError::LoadShed { .. } => {
                ErrorCategory::RateLimit
            }
            ServiceError::InternalError { .. } | ServiceError::TemporarilyUnavailable { .. } => {
                ErrorCategory::Server
            }
            ServiceError::Connection { .. } => ErrorCategory::Network,
            ServiceError::Serialization { .. } => ErrorCategory::Serialization,
            ServiceError::CircuitBreakerOpen { .. } | ServiceError::BulkheadFull { .. } => {
                ErrorCategory::Circuit
            }
            ServiceError::Configuration { .. } => ErrorCategory::Config,
            ServiceError::SoapFault { server_fault, .. } => {
                if *server_fault {
                    ErrorCategory::Server
                } else {
                    ErrorCategory::Client
                }
            }
            ServiceError::Unknown { .. } => ErrorCategory::Unknown,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            ServiceError::Validation { context, .. }
            | ServiceError::Unprocessable { context, .. }
            | ServiceError::Authentication { context, .. }
            | ServiceError::NotFound { context, .. }
            | ServiceError::Conflict { context, .. }
            | ServiceError::Timeout { context, .. }
            | ServiceError::RateLimit { context, .. }
            | ServiceError::InternalError { context, .. }
            | ServiceError::TemporarilyUnavailable { context, .. }
            | ServiceError::Connection { context, .. }
            | ServiceError::Serialization { context, .. }
            | ServiceError::CircuitBreakerOpen { context }
            | ServiceError::BulkheadFull { context }
            | ServiceError::LoadShed { context, .. }
            | ServiceError::Configuration { context, .. }
            | ServiceError::SoapFault { context, .. }
            | ServiceError::Unknown { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            ServiceError::Validation { context, .. }
            | ServiceError::Unprocessable { context, .. }
            | ServiceError::Authentication { context, .. }
            | ServiceError::NotFound { context, .. }
            | ServiceError::Conflict { context, .. }
            | ServiceError::Timeout { context, .. }
            | ServiceError::RateLimit { context, .. }
            | ServiceError::InternalError { context, .. }
            | ServiceError::TemporarilyUnavailable { context, .. }
            | ServiceError::Connection { context, .. }
            | ServiceError::Serialization { context, .. }
            | ServiceError::CircuitBreakerOpen { context }
            | ServiceError::BulkheadFull { context }
            | ServiceError::LoadShed { context, .. }
            | ServiceError::Configuration { context, .. }
            | ServiceError::SoapFault { context, .. }
            | ServiceError::Unknown { context, .. } => context,
        }
    }

    /// Copy with the retry attempt recorded in the context.
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.context_mut().retry_attempt = attempt;
        self
    }

    /// Short, stable variant name for metrics labels.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ServiceError::Validation { .. } => "validation",
            ServiceError::Unprocessable { .. } => "unprocessable",
            ServiceError::Authentication { .. } => "authentication",
            ServiceError::NotFound { .. } => "not_found",
            ServiceError::Conflict { .. } => "conflict",
            ServiceError::Timeout { .. } => "timeout",
            ServiceError::RateLimit { .. } => "rate_limit",
            ServiceError::InternalError { .. } => "internal_error",
            ServiceError::TemporarilyUnavailable { .. } => "temporarily_unavailable",
            ServiceError::Connection { .. } => "connection",
            ServiceError::Serialization { .. } => "serialization",
            ServiceError::CircuitBreakerOpen { .. } => "circuit_breaker_open",
            ServiceError::BulkheadFull { .. } => "bulkhead_full",
            ServiceError::LoadShed { .. } => "load_shed",
            ServiceError::Configuration { .. } => "configuration",
            ServiceError::SoapFault { .. } => "soap_fault",
            ServiceError::Unknown { .. } => "unknown",
        }
    }

    /// Field-level validation errors, when the variant carries them.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ServiceError::Unprocessable { field_errors, .. } => field_errors,
            _ => &[],
        }
    }

    fn message_text(&self) -> &str {
        match self {
            ServiceError::Validation { message, .. }
            | ServiceError::Unprocessable { message, .. }
            | ServiceError::Authentication { message, .. }
            | ServiceError::NotFound { message, .. }
            | ServiceError::Conflict { message, .. }
            | ServiceError::Timeout { message, .. }
            | ServiceError::RateLimit { message, .. }
            | ServiceError::InternalError { message, .. }
            | ServiceError::TemporarilyUnavailable { message, .. }
            | ServiceError::Connection { message, .. }
            | ServiceError::Serialization { message, .. }
            | ServiceError::Configuration { message, .. }
            | ServiceError::Unknown { message, .. } => message,
            ServiceError::CircuitBreakerOpen { .. } => "circuit breaker is open",
            ServiceError::BulkheadFull { .. } => "bulkhead capacity exhausted",
            ServiceError::LoadShed { reason, .. } => reason,
            ServiceError::SoapFault { fault_string, .. } => fault_string,
        }
    }
}

impl Retryable for ServiceError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            ServiceError::Timeout { .. }
                | ServiceError::RateLimit { .. }
                | ServiceError::InternalError { .. }
                | ServiceError::TemporarilyUnavailable { .. }
                | ServiceError::Connection { .. }
                | ServiceError::CircuitBreakerOpen { .. }
                | ServiceError::BulkheadFull { .. }
                | ServiceError::LoadShed { .. }
        )
    }

    fn suggested_delay(&self) -> Option<Duration> {
        match self {
            ServiceError::Timeout { .. } => Some(Duration::from_secs(2)),
            ServiceError::RateLimit { retry_after, .. } => {
                Some(retry_after.unwrap_or(Duration::from_secs(60)))
            }
            ServiceError::InternalError { .. } => Some(Duration::from_secs(2)),
            ServiceError::TemporarilyUnavailable { .. } => Some(Duration::from_secs(5)),
            ServiceError::Connection { .. } => Some(Duration::from_secs(1)),
            ServiceError::CircuitBreakerOpen { .. } => Some(Duration::from_secs(5)),
            ServiceError::BulkheadFull { .. } => Some(Duration::from_millis(500)),
            ServiceError::LoadShed { .. } => Some(Duration::from_secs(3)),
            _ => None,
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ctx = self.context();
        let status = match (ctx.http_status, ctx.grpc_status.as_deref()) {
            (Some(s), _) => s.to_string(),
            (None, Some(g)) => g.to_string(),
            (None, None) => "-".to_string(),
        };
        write!(
            f,
            "{} [service={}, endpoint={}, status={}, request_id={}, elapsed={}ms, attempt={}]",
            self.message_text(),
            ctx.service,
            ctx.endpoint,
            status,
            ctx.request_id,
            ctx.elapsed.as_millis(),
            ctx.retry_attempt,
        )
    }
}

impl std::error::Error for ServiceError {}
