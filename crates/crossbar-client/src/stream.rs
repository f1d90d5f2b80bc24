use crate::pipeline::map_transport_error;
use crate::transport::StreamItem;
use crossbar_core::{ErrorContext, ServiceError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Consumer side of an open stream.
///
/// Items arrive in order over a bounded channel; backpressure propagates to
/// the transport when the consumer lags. Dropping the handle cancels the
/// upstream call.
pub struct StreamHandle {
    items: mpsc::Receiver<StreamItem>,
    cancel: CancellationToken,
    context: ErrorContext,
}

impl StreamHandle {
    pub(crate) fn new(
        items: mpsc::Receiver<StreamItem>,
        cancel: CancellationToken,
        context: ErrorContext,
    ) -> Self {
        Self {
            items,
            cancel,
            context,
        }
    }

    /// Next item; `None` when the stream completed normally. An `Err` item
    /// is terminal: the transport closes the channel after sending it.
    pub async fn next(&mut self) -> Option<Result<Vec<u8>, ServiceError>> {
        match self.items.recv().await {
            Some(Ok(bytes)) => Some(Ok(bytes)),
            Some(Err(transport_error)) => {
                Some(Err(map_transport_error(transport_error, self.context.clone())))
            }
            None => None,
        }
    }

    /// Cancels the upstream call without dropping the handle.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
