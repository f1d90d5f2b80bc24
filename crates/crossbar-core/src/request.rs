use crate::headers::HeaderMap;
use crate::protocol::Protocol;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// A per-call attribute value.
///
/// Attributes are the side-channel interceptors use to communicate; they are
/// kept to plain scalar types so requests stay cheap to clone and `Send`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// Opaque request payload plus its content-type tag.
///
/// The pipeline never interprets the bytes; serialization happened in the
/// per-protocol builder that produced the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    bytes: Vec<u8>,
    content_type: String,
}

impl Body {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
        }
    }

    pub fn json(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(bytes, "application/json")
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// An immutable service request.
///
/// Produced by a per-protocol builder and threaded through interceptors and
/// the execution pipeline. All mutation happens through the `with_*` methods,
/// which return a new instance; existing values are never modified in place.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    service: String,
    endpoint: String,
    method: String,
    protocol: Protocol,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    path_params: BTreeMap<String, String>,
    body: Option<Body>,
    timeout: Option<Duration>,
    attributes: BTreeMap<String, AttrValue>,
    request_id: String,
    correlation_id: Option<String>,
}

impl Request {
    /// Starts a builder for the given protocol and logical service name.
    pub fn builder(protocol: Protocol, service: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(protocol, service)
    }

    /// Logical service name; the key under which all per-service policies
    /// (circuit, bulkhead, limiter, timeout, shedder) are resolved.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// URL path template, RPC method name, or SOAP operation name.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    pub fn path_params(&self) -> &BTreeMap<String, String> {
        &self.path_params
    }

    pub fn body(&self) -> Option<&Body> {
        self.body.as_ref()
    }

    /// Caller-supplied deadline for the whole call, all attempts included.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttrValue> {
        &self.attributes
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Returns a copy with one additional header appended.
    pub fn with_header(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.headers.append(name, value);
        next
    }

    /// Returns a copy with all values for `name` replaced.
    pub fn with_header_replaced(&self, name: &str, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.headers.set(name, value);
        next
    }

    /// Returns a copy with the attribute set.
    pub fn with_attribute(&self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        let mut next = self.clone();
        next.attributes.insert(key.into(), value.into());
        next
    }

    /// Returns a copy with the call deadline replaced.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let mut next = self.clone();
        next.timeout = Some(timeout);
        next
    }

    /// Returns a copy with a different body.
    pub fn with_body(&self, body: Body) -> Self {
        let mut next = self.clone();
        next.body = Some(body);
        next
    }

    /// Returns a copy with the correlation id set.
    pub fn with_correlation_id(&self, id: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.correlation_id = Some(id.into());
        next
    }
}

/// Builder for [`Request`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    service: String,
    endpoint: String,
    method: String,
    protocol: Protocol,
    headers: HeaderMap,
    query: Vec<(String, String)>,
    path_params: BTreeMap<String, String>,
    body: Option<Body>,
    timeout: Option<Duration>,
    attributes: BTreeMap<String, AttrValue>,
    request_id: Option<String>,
    correlation_id: Option<String>,
}

impl RequestBuilder {
    fn new(protocol: Protocol, service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            endpoint: String::new(),
            method: String::from("GET"),
            protocol,
            headers: HeaderMap::new(),
            query: Vec::new(),
            path_params: BTreeMap::new(),
            body: None,
            timeout: None,
            attributes: BTreeMap::new(),
            request_id: None,
            correlation_id: None,
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Overrides the generated request id. Mostly useful in tests and when
    /// propagating an id minted upstream.
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn build(self) -> Request {
        Request {
            service: self.service,
            endpoint: self.endpoint,
            method: self.method,
            protocol: self.protocol,
            headers: self.headers,
            query: self.query,
            path_params: self.path_params,
            body: self.body,
            timeout: self.timeout,
            attributes: self.attributes,
            request_id: self
                .request_id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            correlation_id: self.correlation_id,
        }
    }
}
