//! HTTP status → taxonomy mapping.

use crate::context::ErrorContext;
use crate::error::ServiceError;
use crate::error_body::{extract_field_errors, message_or_body};
use crate::headers::HeaderMap;
use std::time::Duration;

/// Parses an integer-seconds `Retry-After` header.
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Maps a non-success HTTP response into the error taxonomy.
///
/// The wire status and a body excerpt are recorded on the context before the
/// variant is chosen, so no mapping path loses them.
pub fn map_http(status: i32, body: &[u8], headers: &HeaderMap, ctx: ErrorContext) -> ServiceError {
    let context = Box::new({
        let mut c = ctx;
        c.http_status = Some(status);
        if c.body_excerpt.is_none() && !body.is_empty() {
            let cut = body.len().min(crate::context::MAX_BODY_EXCERPT_BYTES);
            c.body_excerpt = Some(String::from_utf8_lossy(&body[..cut]).into_owned());
        }
        c
    });
    let fallback = format!("HTTP {status}");
    let message = message_or_body(body, &fallback);

    match status {
        400 => ServiceError::Validation { context, message },
        422 => ServiceError::Unprocessable {
            context,
            message,
            field_errors: extract_field_errors(body),
        },
        401 | 403 => ServiceError::Authentication { context, message },
        404 => ServiceError::NotFound { context, message },
        409 => ServiceError::Conflict { context, message },
        408 => ServiceError::Timeout { context, message },
        429 => ServiceError::RateLimit {
            context,
            message,
            retry_after: retry_after(headers),
        },
        500 => ServiceError::InternalError { context, message },
        502 | 503 | 504 => ServiceError::TemporarilyUnavailable { context, message },
        _ => ServiceError::Unknown { context, message },
    }
}

/// Maps a SOAP fault into the taxonomy.
///
/// Fault codes naming the sender (`Client`, `Sender`) classify as client
/// faults; everything else is attributed to the server. SOAP faults are never
/// retried.
pub fn map_soap_fault(
    fault_code: impl Into<String>,
    fault_string: impl Into<String>,
    ctx: ErrorContext,
) -> ServiceError {
    let fault_code = fault_code.into();
    let local = fault_code
        .rsplit(|c| c == ':' || c == '.')
        .next()
        .unwrap_or(&fault_code);
    let server_fault = !(local.eq_ignore_ascii_case("client") || local.eq_ignore_ascii_case("sender"));
    ServiceError::SoapFault {
        context: Box::new(ctx),
        fault_code,
        fault_string: fault_string.into(),
        server_fault,
    }
}
