use crossbar_core::ServiceError;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Frame kinds the supervisor distinguishes. Compression and binary vs text
/// are transport settings and never reach this level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Data,
    Heartbeat,
}

/// An outbound frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: String,
    pub payload: Vec<u8>,
    pub kind: FrameKind,
}

impl Frame {
    pub fn data(id: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            payload,
            kind: FrameKind::Data,
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload: Vec::new(),
            kind: FrameKind::Heartbeat,
        }
    }
}

/// An established socket the supervisor can write to.
///
/// Reads are the transport layer's business; it feeds inbound heartbeats and
/// acknowledgements back through the supervisor's `observe_*` methods.
pub trait WsConnection: Send + Sync {
    fn transmit(&self, frame: Frame) -> BoxFuture<'static, Result<(), ServiceError>>;
}

/// Dials a new connection. Called on first start and on every reconnect.
pub trait WsConnector: Send + Sync {
    fn connect(&self) -> BoxFuture<'static, Result<Arc<dyn WsConnection>, ServiceError>>;
}
