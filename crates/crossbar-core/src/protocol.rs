use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire protocol a request travels over.
///
/// The pipeline never inspects protocol payloads; the tag exists so error
/// mappers and observability can label calls correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    /// HTTP/JSON.
    Rest,
    /// gRPC unary or streaming.
    Grpc,
    /// SOAP over HTTP.
    Soap,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Rest => f.write_str("REST"),
            Protocol::Grpc => f.write_str("gRPC"),
            Protocol::Soap => f.write_str("SOAP"),
        }
    }
}
