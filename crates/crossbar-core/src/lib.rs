//! Core model shared by every crossbar component.
//!
//! This crate holds the pieces the rest of the workspace is built on:
//!
//! - The immutable [`Request`]/[`Response`] values that flow through the
//!   execution pipeline, independent of any concrete transport.
//! - The error taxonomy: [`ServiceError`], [`ErrorCategory`] and the
//!   [`Retryable`] trait the retry policy consults.
//! - [`ErrorContext`], the metadata record attached to every failure.
//! - Mappers from HTTP status codes, gRPC status names and SOAP fault codes
//!   into the taxonomy, including error-body message extraction.
//! - The event-listener infrastructure used by all resilience patterns for
//!   observability callbacks.
//!
//! Nothing in this crate performs I/O.

pub mod error_body;
pub mod events;
pub mod grpc_mapper;
pub mod headers;
pub mod http_mapper;

mod context;
mod error;
mod protocol;
mod request;
mod response;

pub use context::{ErrorContext, ErrorContextBuilder, MAX_BODY_EXCERPT_BYTES};
pub use error::{ErrorCategory, FieldError, Retryable, ServiceError};
pub use events::{EventListener, EventListeners, FnListener, ResilienceEvent};
pub use grpc_mapper::{map_grpc, GrpcStatus};
pub use headers::{mask_header_value, HeaderMap, SENSITIVE_HEADERS};
pub use http_mapper::{map_http, map_soap_fault, retry_after};
pub use protocol::Protocol;
pub use request::{AttrValue, Body, Request, RequestBuilder};
pub use response::{Response, NO_STATUS};
