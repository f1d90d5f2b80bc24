//! gRPC status → taxonomy mapping.

use crate::context::ErrorContext;
use crate::error::ServiceError;
use std::fmt;

/// gRPC status codes, by canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum GrpcStatus {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl GrpcStatus {
    /// Canonical SCREAMING_SNAKE name, as carried on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            GrpcStatus::Ok => "OK",
            GrpcStatus::Cancelled => "CANCELLED",
            GrpcStatus::Unknown => "UNKNOWN",
            GrpcStatus::InvalidArgument => "INVALID_ARGUMENT",
            GrpcStatus::DeadlineExceeded => "DEADLINE_EXCEEDED",
            GrpcStatus::NotFound => "NOT_FOUND",
            GrpcStatus::AlreadyExists => "ALREADY_EXISTS",
            GrpcStatus::PermissionDenied => "PERMISSION_DENIED",
            GrpcStatus::ResourceExhausted => "RESOURCE_EXHAUSTED",
            GrpcStatus::FailedPrecondition => "FAILED_PRECONDITION",
            GrpcStatus::Aborted => "ABORTED",
            GrpcStatus::OutOfRange => "OUT_OF_RANGE",
            GrpcStatus::Unimplemented => "UNIMPLEMENTED",
            GrpcStatus::Internal => "INTERNAL",
            GrpcStatus::Unavailable => "UNAVAILABLE",
            GrpcStatus::DataLoss => "DATA_LOSS",
            GrpcStatus::Unauthenticated => "UNAUTHENTICATED",
        }
    }

    /// Parses a canonical name; unrecognized names come back as `Unknown`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "OK" => GrpcStatus::Ok,
            "CANCELLED" => GrpcStatus::Cancelled,
            "INVALID_ARGUMENT" => GrpcStatus::InvalidArgument,
            "DEADLINE_EXCEEDED" => GrpcStatus::DeadlineExceeded,
            "NOT_FOUND" => GrpcStatus::NotFound,
            "ALREADY_EXISTS" => GrpcStatus::AlreadyExists,
            "PERMISSION_DENIED" => GrpcStatus::PermissionDenied,
            "RESOURCE_EXHAUSTED" => GrpcStatus::ResourceExhausted,
            "FAILED_PRECONDITION" => GrpcStatus::FailedPrecondition,
            "ABORTED" => GrpcStatus::Aborted,
            "OUT_OF_RANGE" => GrpcStatus::OutOfRange,
            "UNIMPLEMENTED" => GrpcStatus::Unimplemented,
            "INTERNAL" => GrpcStatus::Internal,
            "UNAVAILABLE" => GrpcStatus::Unavailable,
            "DATA_LOSS" => GrpcStatus::DataLoss,
            "UNAUTHENTICATED" => GrpcStatus::Unauthenticated,
            _ => GrpcStatus::Unknown,
        }
    }
}

impl fmt::Display for GrpcStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps a failed gRPC call into the error taxonomy.
///
/// `RESOURCE_EXHAUSTED` carries no `Retry-After` equivalent; the rate-limit
/// variant falls back to its 60 s default delay.
pub fn map_grpc(status: GrpcStatus, message: impl Into<String>, ctx: ErrorContext) -> ServiceError {
    let message = message.into();
    let context = Box::new({
        let mut c = ctx;
        c.grpc_status = Some(status.name().to_string());
        c
    });

    match status {
        GrpcStatus::InvalidArgument | GrpcStatus::FailedPrecondition | GrpcStatus::OutOfRange => {
            ServiceError::Validation { context, message }
        }
        GrpcStatus::Unauthenticated | GrpcStatus::PermissionDenied => {
            ServiceError::Authentication { context, message }
        }
        GrpcStatus::NotFound => ServiceError::NotFound { context, message },
        GrpcStatus::Aborted | GrpcStatus::AlreadyExists => {
            ServiceError::Conflict { context, message }
        }
        GrpcStatus::DeadlineExceeded => ServiceError::Timeout { context, message },
        GrpcStatus::ResourceExhausted => ServiceError::RateLimit {
            context,
            message,
            retry_after: None,
        },
        GrpcStatus::Internal | GrpcStatus::DataLoss | GrpcStatus::Unknown => {
            ServiceError::InternalError { context, message }
        }
        GrpcStatus::Unavailable => ServiceError::TemporarilyUnavailable { context, message },
        GrpcStatus::Ok | GrpcStatus::Cancelled | GrpcStatus::Unimplemented => {
            ServiceError::Unknown { context, message }
        }
    }
}
