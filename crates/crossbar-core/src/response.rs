use crate::headers::HeaderMap;
use crate::request::AttrValue;
use std::collections::BTreeMap;
use std::time::Duration;

/// Status code used when the protocol carries no numeric code.
pub const NO_STATUS: i32 = -1;

/// The outcome of a completed call.
///
/// The body stays opaque; deserialization belongs to the per-protocol layer
/// above the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    body: Vec<u8>,
    status: i32,
    headers: HeaderMap,
    elapsed: Duration,
    success: bool,
    attributes: BTreeMap<String, AttrValue>,
}

impl Response {
    pub fn new(status: i32, body: impl Into<Vec<u8>>, headers: HeaderMap, elapsed: Duration) -> Self {
        let success = status == NO_STATUS || (200..300).contains(&status);
        Self {
            body: body.into(),
            status,
            headers,
            elapsed,
            success,
            attributes: BTreeMap::new(),
        }
    }

    /// A synthetic success response, used by interceptors that short-circuit
    /// (cache hits, chaos pass-through fabrication).
    pub fn synthetic(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body, HeaderMap::new(), Duration::ZERO)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Numeric status; [`NO_STATUS`] when the protocol has none.
    pub fn status(&self) -> i32 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Returns a copy with the attribute set; the original is unchanged.
    pub fn with_attribute(&self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        let mut next = self.clone();
        next.attributes.insert(key.into(), value.into());
        next
    }

    /// Returns a copy with the elapsed time replaced. The pipeline stamps the
    /// final wall time after interceptors have run.
    pub fn with_elapsed(&self, elapsed: Duration) -> Self {
        let mut next = self.clone();
        next.elapsed = elapsed;
        next
    }
}
