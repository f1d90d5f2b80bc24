//! Scripted transports shared by the pipeline tests.

use crossbar_client::{RawResponse, Transport, TransportError};
use crossbar_core::{HeaderMap, Request};
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// One scripted reply.
#[derive(Clone)]
pub enum Reply {
    Http {
        status: i32,
        headers: Vec<(&'static str, &'static str)>,
        body: &'static str,
    },
    Io(&'static str),
}

impl Reply {
    pub fn ok(body: &'static str) -> Self {
        Reply::Http {
            status: 200,
            headers: Vec::new(),
            body,
        }
    }

    pub fn status(status: i32, body: &'static str) -> Self {
        Reply::Http {
            status,
            headers: Vec::new(),
            body,
        }
    }
}

/// Replays a fixed sequence of replies, then repeats the last one. Counts
/// invocations and can delay each reply.
pub struct ScriptedTransport {
    replies: Vec<Reply>,
    pub invocations: AtomicUsize,
    delay: Duration,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies,
            invocations: AtomicUsize::new(0),
            delay: Duration::from_millis(1),
        })
    }

    pub fn with_delay(replies: Vec<Reply>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            replies,
            invocations: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        _request: Request,
        _deadline: Instant,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        let n = self.invocations.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .replies
            .get(n)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or(Reply::Io("script exhausted"));
        let delay = self.delay;
        Box::pin(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    return Err(TransportError::Io {
                        message: "cancelled".into(),
                    });
                }
            }
            match reply {
                Reply::Http {
                    status,
                    headers,
                    body,
                } => {
                    let mut map = HeaderMap::new();
                    for (name, value) in headers {
                        map.append(name, value);
                    }
                    Ok(RawResponse {
                        status,
                        headers: map,
                        body: body.as_bytes().to_vec(),
                    })
                }
                Reply::Io(message) => Err(TransportError::Io {
                    message: message.to_string(),
                }),
            }
        })
    }
}
