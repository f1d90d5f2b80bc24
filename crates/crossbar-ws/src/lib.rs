//! WebSocket session supervision.
//!
//! The supervisor owns the connection lifecycle so callers only ever talk to
//! [`WsSupervisor::send`]:
//!
//! - `connecting → open` on a successful dial; the reconnect counter resets
//!   and the outbound queue flushes in FIFO order.
//! - `open → reconnecting` when heartbeats go stale (no inbound heartbeat
//!   for twice the interval) or a write fails.
//! - `reconnecting → connecting` after an exponential backoff.
//! - `draining` stops accepting new sends, flushes what is queued, then
//!   closes.
//! - `closed` is terminal: the queue is cancelled and pending
//!   acknowledgements are rejected.
//!
//! Messages sent while the session is not open are queued (bounded); a full
//! queue always errors, it never drops silently. Acknowledged sends park a
//! completion in the pending-ack map keyed by message id until the transport
//! layer calls [`WsSupervisor::observe_ack`] or the ack timeout fires.

mod config;
mod connection;
mod error;

pub use config::{WsSupervisorConfig, WsSupervisorConfigBuilder};
pub use connection::{Frame, FrameKind, WsConnection, WsConnector};
pub use error::SendError;

use crossbar_retry::{ExponentialBackoff, IntervalFunction};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

/// Connection phase of a supervised session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionPhase {
    Connecting = 0,
    Open = 1,
    Draining = 2,
    Reconnecting = 3,
    Closed = 4,
}

impl SessionPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionPhase::Connecting,
            1 => SessionPhase::Open,
            2 => SessionPhase::Draining,
            3 => SessionPhase::Reconnecting,
            _ => SessionPhase::Closed,
        }
    }
}

/// Point-in-time view of a session.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub queued_messages: usize,
    pub pending_acks: usize,
    pub reconnect_attempts: u32,
    pub since_last_heartbeat: Duration,
}

struct QueuedMessage {
    id: String,
    payload: Vec<u8>,
    ack: Option<oneshot::Sender<Result<(), SendError>>>,
}

type AckMap = HashMap<String, oneshot::Sender<Result<(), SendError>>>;

/// The supervisor. Share via `Arc`; spawn [`run`](Self::run) once.
pub struct WsSupervisor {
    config: WsSupervisorConfig,
    connector: Arc<dyn WsConnector>,
    phase: AtomicU8,
    connection: Mutex<Option<Arc<dyn WsConnection>>>,
    queue: Mutex<VecDeque<QueuedMessage>>,
    pending_acks: Mutex<AckMap>,
    last_heartbeat: Mutex<Instant>,
    reconnect_attempts: AtomicU32,
    wake: Notify,
    shutdown: CancellationToken,
}

impl WsSupervisor {
    pub fn new(config: WsSupervisorConfig, connector: Arc<dyn WsConnector>) -> Arc<Self> {
        Arc::new(Self {
            config,
            connector,
            phase: AtomicU8::new(SessionPhase::Connecting as u8),
            connection: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
            pending_acks: Mutex::new(AckMap::new()),
            last_heartbeat: Mutex::new(Instant::now()),
            reconnect_attempts: AtomicU32::new(0),
            wake: Notify::new(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn phase(&self) -> SessionPhase {
        SessionPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: SessionPhase) {
        let previous = self.phase.swap(phase as u8, Ordering::AcqRel);
        if previous != phase as u8 {
            tracing::info!(
                from = ?SessionPhase::from_u8(previous),
                to = ?phase,
                "websocket session phase"
            );
            metrics::counter!(
                "ws_phase_transitions_total",
                "to" => format!("{phase:?}")
            )
            .increment(1);
        }
        self.wake.notify_waiters();
    }

    /// Drives the session until closed. Spawn this once per supervisor.
    pub async fn run(self: Arc<Self>) {
        let backoff = ExponentialBackoff::new(self.config.reconnect_base_backoff)
            .max_interval(self.config.reconnect_max_backoff);

        loop {
            match self.phase() {
                SessionPhase::Closed => return,
                SessionPhase::Connecting => self.run_connect().await,
                SessionPhase::Reconnecting => {
                    let attempt = self.reconnect_attempts.fetch_add(1, Ordering::AcqRel);
                    let delay = backoff.next_interval(attempt as usize);
                    tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {
                            if self.phase() == SessionPhase::Reconnecting {
                                self.set_phase(SessionPhase::Connecting);
                            }
                        }
                        _ = self.shutdown.cancelled() => return,
                    }
                }
                SessionPhase::Open => self.run_open_tick().await,
                SessionPhase::Draining => {
                    let connected = self.connection.lock().is_some();
                    if connected {
                        self.flush_queue().await;
                    }
                    // Done, or no connection left to flush over.
                    if self.queue.lock().is_empty() || !connected {
                        self.close_now();
                    } else {
                        self.run_open_tick().await;
                    }
                }
            }
        }
    }

    async fn run_connect(&self) {
        match self.connector.connect().await {
            Ok(connection) => {
                *self.connection.lock() = Some(connection);
                self.reconnect_attempts.store(0, Ordering::Release);
                *self.last_heartbeat.lock() = Instant::now();
                // Keep a draining session draining across reconnects.
                if self.phase() != SessionPhase::Draining {
                    self.set_phase(SessionPhase::Open);
                }
                self.flush_queue().await;
                if self.phase() == SessionPhase::Draining && self.queue.lock().is_empty() {
                    self.close_now();
                }
            }
            Err(error) => {
                tracing::warn!("websocket connect failed: {error}");
                if self.phase() != SessionPhase::Closed {
                    self.set_phase(SessionPhase::Reconnecting);
                }
            }
        }
    }

    async fn run_open_tick(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.config.heartbeat_interval) => {}
            _ = self.wake.notified() => return,
            _ = self.shutdown.cancelled() => return,
        }
        if !matches!(self.phase(), SessionPhase::Open | SessionPhase::Draining) {
            return;
        }

        let stale = self.last_heartbeat.lock().elapsed() > self.config.heartbeat_interval * 2;
        if stale {
            tracing::warn!("heartbeat stale, reconnecting");
            metrics::counter!("ws_heartbeat_stale_total").increment(1);
            self.drop_connection_and_reconnect();
            return;
        }

        let connection = self.connection.lock().clone();
        if let Some(connection) = connection {
            if let Err(error) = connection.transmit(Frame::heartbeat()).await {
                tracing::warn!("heartbeat write failed: {error}");
                self.drop_connection_and_reconnect();
            }
        }
    }

    fn drop_connection_and_reconnect(&self) {
        *self.connection.lock() = None;
        if !matches!(self.phase(), SessionPhase::Closed) {
            self.set_phase(SessionPhase::Reconnecting);
        }
    }

    async fn flush_queue(&self) {
        loop {
            let message = {
                let mut queue = self.queue.lock();
                match queue.pop_front() {
                    Some(m) => m,
                    None => return,
                }
            };
            let connection = self.connection.lock().clone();
            let Some(connection) = connection else {
                // Connection vanished mid-flush; keep FIFO order intact.
                self.queue.lock().push_front(message);
                return;
            };
            let frame = Frame::data(message.id.clone(), message.payload.clone());
            match connection.transmit(frame).await {
                Ok(()) => match message.ack {
                    Some(sender) => {
                        self.pending_acks.lock().insert(message.id, sender);
                    }
                    None => {}
                },
                Err(error) => {
                    tracing::warn!("flush write failed: {error}");
                    self.queue.lock().push_front(message);
                    self.drop_connection_and_reconnect();
                    return;
                }
            }
        }
    }

    /// Sends without requesting an acknowledgement. Queued when not open.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), SendError> {
        self.send_inner(payload, false).await
    }

    /// Sends and waits for the matching acknowledgement.
    pub async fn send_with_ack(&self, payload: Vec<u8>) -> Result<(), SendError> {
        self.send_inner(payload, true).await
    }

    async fn send_inner(&self, payload: Vec<u8>, want_ack: bool) -> Result<(), SendError> {
        match self.phase() {
            SessionPhase::Closed | SessionPhase::Draining => Err(SendError::Closed),
            SessionPhase::Open => {
                let connection = self.connection.lock().clone();
                match connection {
                    Some(connection) => {
                        let id = uuid::Uuid::new_v4().to_string();
                        let receiver = want_ack.then(|| {
                            let (sender, receiver) = oneshot::channel();
                            self.pending_acks.lock().insert(id.clone(), sender);
                            receiver
                        });
                        match connection.transmit(Frame::data(id.clone(), payload.clone())).await {
                            Ok(()) => match receiver {
                                Some(receiver) => self.await_ack(id, receiver).await,
                                None => Ok(()),
                            },
                            Err(error) => {
                                self.pending_acks.lock().remove(&id);
                                tracing::warn!("send failed, queueing and reconnecting: {error}");
                                self.drop_connection_and_reconnect();
                                self.enqueue(payload, want_ack).await
                            }
                        }
                    }
                    // Phase raced with a disconnect.
                    None => self.enqueue(payload, want_ack).await,
                }
            }
            SessionPhase::Connecting | SessionPhase::Reconnecting => {
                self.enqueue(payload, want_ack).await
            }
        }
    }

    async fn enqueue(&self, payload: Vec<u8>, want_ack: bool) -> Result<(), SendError> {
        if !self.config.queueing_enabled {
            return Err(SendError::QueueFull {
                capacity: self.config.queue_max,
            });
        }
        let id = uuid::Uuid::new_v4().to_string();
        let receiver = {
            let mut queue = self.queue.lock();
            if queue.len() >= self.config.queue_max {
                return Err(SendError::QueueFull {
                    capacity: self.config.queue_max,
                });
            }
            let (message, receiver) = if want_ack {
                let (sender, receiver) = oneshot::channel();
                (
                    QueuedMessage {
                        id: id.clone(),
                        payload,
                        ack: Some(sender),
                    },
                    Some(receiver),
                )
            } else {
                (
                    QueuedMessage {
                        id: id.clone(),
                        payload,
                        ack: None,
                    },
                    None,
                )
            };
            queue.push_back(message);
            metrics::gauge!("ws_outbound_queue_depth").set(queue.len() as f64);
            receiver
        };
        match receiver {
            Some(receiver) => self.await_ack(id, receiver).await,
            None => Ok(()),
        }
    }

    async fn await_ack(
        &self,
        id: String,
        receiver: oneshot::Receiver<Result<(), SendError>>,
    ) -> Result<(), SendError> {
        match tokio::time::timeout(self.config.ack_timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SendError::Closed),
            Err(_) => {
                self.pending_acks.lock().remove(&id);
                Err(SendError::AckTimeout { id })
            }
        }
    }

    /// The transport layer observed an acknowledgement for `id`.
    pub fn observe_ack(&self, id: &str) {
        if let Some(sender) = self.pending_acks.lock().remove(id) {
            let _ = sender.send(Ok(()));
        }
    }

    /// The transport layer observed an inbound heartbeat.
    pub fn observe_heartbeat(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    /// Stops accepting sends, flushes the queue, then closes. Without an
    /// open connection there is nothing to flush over, so the session
    /// closes immediately.
    pub fn drain(&self) {
        match self.phase() {
            SessionPhase::Closed => {}
            SessionPhase::Open | SessionPhase::Connecting => {
                self.set_phase(SessionPhase::Draining);
            }
            _ => self.close_now(),
        }
    }

    /// Terminal close: cancels queued messages and rejects pending acks.
    pub fn close(&self) {
        self.close_now();
    }

    fn close_now(&self) {
        self.set_phase(SessionPhase::Closed);
        self.shutdown.cancel();
        *self.connection.lock() = None;

        let queued: Vec<QueuedMessage> = self.queue.lock().drain(..).collect();
        for message in queued {
            if let Some(sender) = message.ack {
                let _ = sender.send(Err(SendError::Closed));
            }
        }
        let pending: Vec<_> = {
            let mut acks = self.pending_acks.lock();
            acks.drain().collect()
        };
        for (_, sender) in pending {
            let _ = sender.send(Err(SendError::Closed));
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase(),
            queued_messages: self.queue.lock().len(),
            pending_acks: self.pending_acks.lock().len(),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Acquire),
            since_last_heartbeat: self.last_heartbeat.lock().elapsed(),
        }
    }
}
