//! Chunked upload orchestration.
//!
//! Input bytes are split into fixed-size chunks and pushed through a
//! [`ChunkTransport`] with bounded parallelism. Each chunk retries under the
//! configured policy; a shared cancellation flag aborts in-flight and pending
//! chunks. The session tracks a per-chunk status bitmap, so a failed or
//! cancelled run can resume without re-uploading finished chunks. The caller
//! finalizes explicitly once every chunk reports success; an unfinalized
//! session stays resumable on the server.
//!
//! Pre-upload validation (size ceiling, MIME allowlist, extension allowlist)
//! fails with a `Validation` error and never enters retry.

mod config;
mod progress;
mod session;

pub use config::{UploadConfig, UploadConfigBuilder};
pub use progress::{ProgressCallback, UploadProgress};
pub use session::{UploadSession, UploadSessionSnapshot};

use crossbar_core::{ErrorContext, ServiceError};
use crossbar_retry::RetryDecision;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One chunk on its way to the server.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    pub session_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub data: Vec<u8>,
}

/// Server-side operations the uploader drives. Implemented over the same
/// transport layer as the rest of the client.
pub trait ChunkTransport: Send + Sync {
    fn upload_chunk(
        &self,
        chunk: ChunkRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<(), ServiceError>>;

    /// Completes the session once every chunk has been received.
    fn finalize(
        &self,
        session_id: String,
        total_chunks: usize,
    ) -> BoxFuture<'static, Result<(), ServiceError>>;
}

/// The orchestrator.
pub struct Uploader {
    config: UploadConfig,
    transport: Arc<dyn ChunkTransport>,
}

impl Uploader {
    pub fn new(config: UploadConfig, transport: Arc<dyn ChunkTransport>) -> Self {
        Self { config, transport }
    }

    /// Validates the input and opens a session. No bytes move yet.
    pub fn begin(
        &self,
        data: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<Arc<UploadSession>, ServiceError> {
        self.validate(data.len() as u64, file_name, content_type)?;
        Ok(UploadSession::new(data, self.config.chunk_size))
    }

    fn validate(&self, size: u64, file_name: &str, content_type: &str) -> Result<(), ServiceError> {
        let fail = |message: String| ServiceError::Validation {
            context: Box::new(
                ErrorContext::builder("upload", file_name)
                    .method("POST")
                    .build(),
            ),
            message,
        };

        if let Some(max) = self.config.max_file_size {
            if size > max {
                return Err(fail(format!("file size {size} exceeds maximum {max}")));
            }
        }
        if let Some(allowed) = &self.config.allowed_mime_types {
            if !allowed.contains(&content_type.to_ascii_lowercase()) {
                return Err(fail(format!("content type {content_type} not allowed")));
            }
        }
        if let Some(allowed) = &self.config.allowed_extensions {
            let extension = file_name
                .rsplit_once('.')
                .map(|(_, ext)| ext.to_ascii_lowercase())
                .unwrap_or_default();
            if !allowed.contains(&extension) {
                return Err(fail(format!("file extension {extension:?} not allowed")));
            }
        }
        Ok(())
    }

    /// Uploads every not-yet-done chunk, at most `max_parallel` at a time.
    /// Returns when all chunks are done, the session is cancelled, or a
    /// chunk exhausts its retries.
    pub async fn run(
        &self,
        session: &Arc<UploadSession>,
        progress: Option<ProgressCallback>,
    ) -> Result<(), ServiceError> {
        let pending = session.pending_chunks();
        tracing::debug!(
            session = %session.id(),
            pending = pending.len(),
            total = session.total_chunks(),
            "upload run starting"
        );

        let outcomes = stream::iter(pending)
            .map(|index| self.upload_one(session, index, progress.clone()))
            .buffer_unordered(self.config.max_parallel)
            .collect::<Vec<_>>()
            .await;

        for outcome in outcomes {
            outcome?;
        }
        Ok(())
    }

    async fn upload_one(
        &self,
        session: &Arc<UploadSession>,
        index: usize,
        progress: Option<ProgressCallback>,
    ) -> Result<(), ServiceError> {
        let cancel = session.cancel_token();
        let mut attempt: u32 = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(session.cancelled_error());
            }
            let chunk = ChunkRequest {
                session_id: session.id().to_string(),
                chunk_index: index,
                total_chunks: session.total_chunks(),
                data: session.chunk_data(index),
            };
            let chunk_len = chunk.data.len() as u64;

            let result = tokio::select! {
                result = self.transport.upload_chunk(chunk, cancel.clone()) => result,
                _ = cancel.cancelled() => Err(session.cancelled_error()),
            };

            match result {
                Ok(()) => {
                    session.mark_done(index, chunk_len);
                    metrics::counter!("upload_chunks_total", "outcome" => "ok").increment(1);
                    if let Some(progress) = &progress {
                        (**progress)(session.progress());
                    }
                    return Ok(());
                }
                Err(error) => {
                    if cancel.is_cancelled() {
                        return Err(session.cancelled_error());
                    }
                    metrics::counter!("upload_chunks_total", "outcome" => "error").increment(1);
                    match self.config.retry.decide(&error, attempt, None) {
                        RetryDecision::Retry { delay } => {
                            tracing::debug!(
                                session = %session.id(),
                                chunk = index,
                                attempt,
                                "chunk retry"
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = cancel.cancelled() => return Err(session.cancelled_error()),
                            }
                            attempt += 1;
                        }
                        RetryDecision::Abort => return Err(error),
                    }
                }
            }
        }
    }

    /// Finalizes a fully-uploaded session. Refuses while chunks are missing,
    /// leaving the session resumable.
    pub async fn finalize(&self, session: &UploadSession) -> Result<(), ServiceError> {
        if !session.is_complete() {
            return Err(ServiceError::Validation {
                context: Box::new(
                    ErrorContext::builder("upload", session.id())
                        .method("POST")
                        .build(),
                ),
                message: format!(
                    "{} of {} chunks uploaded; session not complete",
                    session.chunks_done(),
                    session.total_chunks()
                ),
            });
        }
        self.transport
            .finalize(session.id().to_string(), session.total_chunks())
            .await
    }
}
