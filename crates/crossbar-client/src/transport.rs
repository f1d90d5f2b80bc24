use crossbar_core::{GrpcStatus, HeaderMap, Request};
use futures::future::BoxFuture;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Raw bytes and status back from a transport, before error mapping.
///
/// `status` is the HTTP status code, or [`crossbar_core::NO_STATUS`] (-1)
/// for protocols without one; a gRPC call that completes OK arrives here
/// with -1 and its payload.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: i32,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Failures a transport can report without producing a response.
///
/// Anything that did produce a wire status travels as a [`RawResponse`] and
/// is mapped from its status code instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Connect/read/write failure before a response arrived.
    #[error("transport i/o: {message}")]
    Io { message: String },

    /// A gRPC call that completed with a non-OK status.
    #[error("grpc {status}: {message}")]
    Grpc { status: GrpcStatus, message: String },

    /// A SOAP fault envelope.
    #[error("soap fault {fault_code}: {fault_string}")]
    SoapFault {
        fault_code: String,
        fault_string: String,
    },

    /// Body encoding/decoding failed inside the transport layer.
    #[error("serialization: {message}")]
    Serialization { message: String },

    /// The transport does not implement streaming.
    #[error("streaming not supported by this transport")]
    StreamingUnsupported,
}

/// Items flowing out of an open stream; terminal error ends the stream.
pub type StreamItem = Result<Vec<u8>, TransportError>;

/// An open stream: a bounded channel of items. Completion is the channel
/// closing; an `Err` item is terminal.
pub struct RawStream {
    pub items: mpsc::Receiver<StreamItem>,
}

/// What the pipeline consumes from each protocol layer.
///
/// The core never builds wire bytes; serialization happened in the
/// per-protocol request builder, and the response body stays opaque on the
/// way out. `deadline` is the attempt deadline; `cancel` must abort the
/// underlying I/O promptly when fired.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: Request,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>>;

    /// Opens a streaming call. Transports without streaming keep the
    /// default.
    fn open_stream(
        &self,
        request: Request,
        deadline: Instant,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawStream, TransportError>> {
        let _ = (request, deadline, cancel);
        Box::pin(async { Err(TransportError::StreamingUnsupported) })
    }
}

/// Adapter for `tower` services, so an existing middleware stack (hyper,
/// tonic channels, test harnesses) can sit under the pipeline unchanged.
#[derive(Clone)]
pub struct ServiceTransport<S> {
    service: S,
}

impl<S> ServiceTransport<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

impl<S> Transport for ServiceTransport<S>
where
    S: tower::Service<Request, Response = RawResponse, Error = TransportError>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Future: Send + 'static,
{
    fn send(
        &self,
        request: Request,
        _deadline: Instant,
        _cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        use tower::ServiceExt;
        let service = self.service.clone();
        Box::pin(async move { service.oneshot(request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbar_core::Protocol;

    #[tokio::test]
    async fn tower_services_slot_in_as_transports() {
        let service = tower::service_fn(|req: Request| async move {
            Ok::<_, TransportError>(RawResponse::ok(req.endpoint().as_bytes().to_vec()))
        });
        let transport = ServiceTransport::new(service);
        let request = Request::builder(Protocol::Rest, "svc").endpoint("/ping").build();
        let raw = transport
            .send(request, Instant::now(), CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(raw.body, b"/ping");
    }

    #[tokio::test]
    async fn default_streaming_is_unsupported() {
        struct Unary;
        impl Transport for Unary {
            fn send(
                &self,
                _request: Request,
                _deadline: Instant,
                _cancel: CancellationToken,
            ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
                Box::pin(async { Ok(RawResponse::ok(Vec::new())) })
            }
        }
        let result = Unary
            .open_stream(
                Request::builder(Protocol::Grpc, "svc").build(),
                Instant::now(),
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(TransportError::StreamingUnsupported)));
    }
}
