//! Streaming calls: policies at open, bounded delivery, cancel-on-drop.

use crossbar_client::{Client, CrossbarConfig, RawResponse, RawStream, Transport, TransportError};
use crossbar_core::{Protocol, Request, ServiceError};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Streams a fixed set of frames, then completes. Remembers the cancel
/// token handed to the last open so tests can observe propagation.
struct StreamingTransport {
    frames: Vec<Result<Vec<u8>, TransportError>>,
    fail_opens: usize,
    opens: Mutex<usize>,
    last_cancel: Mutex<Option<CancellationToken>>,
}

impl StreamingTransport {
    fn new(frames: Vec<Result<Vec<u8>, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            frames,
            fail_opens: 0,
            opens: Mutex::new(0),
            last_cancel: Mutex::new(None),
        })
    }

    fn failing_first(frames: Vec<Result<Vec<u8>, TransportError>>, fail_opens: usize) -> Arc<Self> {
        Arc::new(Self {
            frames,
            fail_opens,
            opens: Mutex::new(0),
            last_cancel: Mutex::new(None),
        })
    }
}

impl Transport for StreamingTransport {
    fn send(
        &self,
        _request: Request,
        _deadline: Instant,
        _cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        Box::pin(async { Ok(RawResponse::ok(Vec::new())) })
    }

    fn open_stream(
        &self,
        _request: Request,
        _deadline: Instant,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawStream, TransportError>> {
        let n = {
            let mut opens = self.opens.lock();
            *opens += 1;
            *opens
        };
        *self.last_cancel.lock() = Some(cancel);
        let fail = n <= self.fail_opens;
        let frames = self.frames.clone();
        Box::pin(async move {
            if fail {
                return Err(TransportError::Io {
                    message: "open refused".into(),
                });
            }
            let (tx, rx) = tokio::sync::mpsc::channel(frames.len().max(1));
            for frame in frames {
                let _ = tx.send(frame).await;
            }
            Ok(RawStream { items: rx })
        })
    }
}

fn stream_client(transport: Arc<StreamingTransport>) -> Client {
    let mut config = CrossbarConfig::default();
    config.retry.max_attempts = 3;
    config.retry.base_backoff_ms = 5;
    config.retry.max_backoff_ms = 10;
    config.retry.jitter = 0.0;
    Client::grpc().config(config).transport(transport).build().unwrap()
}

#[tokio::test]
async fn delivers_items_in_order_then_completes() {
    let transport = StreamingTransport::new(vec![
        Ok(b"one".to_vec()),
        Ok(b"two".to_vec()),
        Ok(b"three".to_vec()),
    ]);
    let client = stream_client(Arc::clone(&transport));

    let request = Request::builder(Protocol::Grpc, "feed").endpoint("Feed/Watch").build();
    let mut stream = client.execute_stream(request).await.unwrap();

    let mut collected = Vec::new();
    while let Some(item) = stream.next().await {
        collected.push(item.unwrap());
    }
    assert_eq!(collected, vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
}

#[tokio::test]
async fn terminal_error_items_are_mapped() {
    let transport = StreamingTransport::new(vec![
        Ok(b"one".to_vec()),
        Err(TransportError::Io {
            message: "reset mid-stream".into(),
        }),
    ]);
    let client = stream_client(Arc::clone(&transport));

    let request = Request::builder(Protocol::Grpc, "feed").endpoint("Feed/Watch").build();
    let mut stream = client.execute_stream(request).await.unwrap();

    assert!(stream.next().await.unwrap().is_ok());
    let error = stream.next().await.unwrap().unwrap_err();
    assert!(matches!(error, ServiceError::Connection { .. }));
}

#[tokio::test]
async fn open_failures_retry_like_unary_calls() {
    let transport = StreamingTransport::failing_first(vec![Ok(b"late".to_vec())], 2);
    let client = stream_client(Arc::clone(&transport));

    let request = Request::builder(Protocol::Grpc, "feed").endpoint("Feed/Watch").build();
    let mut stream = client.execute_stream(request).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), b"late".to_vec());
    assert_eq!(*transport.opens.lock(), 3);
}

#[tokio::test]
async fn dropping_the_handle_cancels_upstream() {
    let transport = StreamingTransport::new(vec![Ok(b"one".to_vec())]);
    let client = stream_client(Arc::clone(&transport));

    let request = Request::builder(Protocol::Grpc, "feed").endpoint("Feed/Watch").build();
    let stream = client.execute_stream(request).await.unwrap();
    let upstream = transport.last_cancel.lock().clone().unwrap();
    assert!(!upstream.is_cancelled());

    drop(stream);
    assert!(upstream.is_cancelled());
}
