use crossbar_core::ServiceError;

/// Why a send did not complete.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The session is not open and the outbound queue is at capacity, or
    /// queueing is disabled.
    #[error("outbound queue full ({capacity} messages)")]
    QueueFull { capacity: usize },

    /// The session is terminally closed.
    #[error("session closed")]
    Closed,

    /// No acknowledgement arrived within the ack timeout.
    #[error("no acknowledgement for message {id}")]
    AckTimeout { id: String },

    /// The underlying transport failed the write.
    #[error(transparent)]
    Transport(#[from] ServiceError),
}
