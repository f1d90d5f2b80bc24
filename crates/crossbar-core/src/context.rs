use crate::headers::HeaderMap;
use crate::protocol::Protocol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

/// Upper bound on the response-body excerpt carried in an error context.
pub const MAX_BODY_EXCERPT_BYTES: usize = 1000;

/// Metadata describing a failure.
///
/// Built on the failure path and attached to the resulting
/// [`ServiceError`](crate::ServiceError) for its whole lifetime. Construction
/// is cheap (no allocation beyond the owned strings) and the record is
/// immutable once built; the pipeline produces an updated copy per retry
/// attempt rather than mutating in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub service: String,
    pub endpoint: String,
    pub method: String,
    pub protocol: Protocol,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    pub timestamp: SystemTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grpc_status: Option<String>,
    /// First [`MAX_BODY_EXCERPT_BYTES`] of the response body, lossily decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_excerpt: Option<String>,
    /// Headers selected for diagnostics; sensitive names are masked before
    /// they ever reach this record.
    #[serde(default)]
    pub headers: HeaderMap,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    pub retry_attempt: u32,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ErrorContext {
    pub fn builder(service: impl Into<String>, endpoint: impl Into<String>) -> ErrorContextBuilder {
        ErrorContextBuilder::new(service, endpoint)
    }

    /// Copy with the retry attempt bumped; used when the pipeline re-enters
    /// the gate stack.
    pub fn with_attempt(&self, attempt: u32) -> Self {
        let mut next = self.clone();
        next.retry_attempt = attempt;
        next
    }
}

/// Builder for [`ErrorContext`].
#[derive(Debug, Clone)]
pub struct ErrorContextBuilder {
    ctx: ErrorContext,
}

impl ErrorContextBuilder {
    fn new(service: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            ctx: ErrorContext {
                service: service.into(),
                endpoint: endpoint.into(),
                method: String::new(),
                protocol: Protocol::Rest,
                request_id: String::new(),
                correlation_id: None,
                timestamp: SystemTime::now(),
                http_status: None,
                grpc_status: None,
                body_excerpt: None,
                headers: HeaderMap::new(),
                elapsed: Duration::ZERO,
                retry_attempt: 0,
                attributes: BTreeMap::new(),
            },
        }
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.ctx.method = method.into();
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.ctx.protocol = protocol;
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.ctx.request_id = id.into();
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.ctx.correlation_id = Some(id.into());
        self
    }

    pub fn http_status(mut self, status: i32) -> Self {
        self.ctx.http_status = Some(status);
        self
    }

    pub fn grpc_status(mut self, status: impl Into<String>) -> Self {
        self.ctx.grpc_status = Some(status.into());
        self
    }

    /// Stores a lossily-decoded excerpt of the response body, truncated at
    /// [`MAX_BODY_EXCERPT_BYTES`].
    pub fn body_excerpt(mut self, body: &[u8]) -> Self {
        if !body.is_empty() {
            let cut = body.len().min(MAX_BODY_EXCERPT_BYTES);
            self.ctx.body_excerpt = Some(String::from_utf8_lossy(&body[..cut]).into_owned());
        }
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.ctx.headers = headers;
        self
    }

    pub fn elapsed(mut self, elapsed: Duration) -> Self {
        self.ctx.elapsed = elapsed;
        self
    }

    pub fn retry_attempt(mut self, attempt: u32) -> Self {
        self.ctx.retry_attempt = attempt;
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.ctx.attributes.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ErrorContext {
        self.ctx
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}
