use crate::progress::UploadProgress;
use crossbar_core::{ErrorContext, ServiceError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Samples kept for the rolling speed estimate.
const SPEED_WINDOW: Duration = Duration::from_secs(10);

/// Summary of a session for the observability surface.
#[derive(Debug, Clone)]
pub struct UploadSessionSnapshot {
    pub session_id: String,
    pub total_size: u64,
    pub chunk_size: usize,
    pub chunks_done: usize,
    pub total_chunks: usize,
    pub bytes_transferred: u64,
    pub cancelled: bool,
}

/// One upload in progress. Holds the payload and the per-chunk bitmap so a
/// failed run can resume.
pub struct UploadSession {
    id: String,
    data: Vec<u8>,
    chunk_size: usize,
    done: Mutex<Vec<bool>>,
    bytes_transferred: AtomicU64,
    cancel: CancellationToken,
    started_at: Instant,
    speed_samples: Mutex<VecDeque<(Instant, u64)>>,
}

impl UploadSession {
    pub(crate) fn new(data: Vec<u8>, chunk_size: usize) -> Arc<Self> {
        let total_chunks = data.len().div_ceil(chunk_size).max(1);
        Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            data,
            chunk_size,
            done: Mutex::new(vec![false; total_chunks]),
            bytes_transferred: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            started_at: Instant::now(),
            speed_samples: Mutex::new(VecDeque::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn total_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn total_chunks(&self) -> usize {
        self.done.lock().len()
    }

    pub fn chunks_done(&self) -> usize {
        self.done.lock().iter().filter(|d| **d).count()
    }

    pub fn is_complete(&self) -> bool {
        self.done.lock().iter().all(|d| *d)
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Acquire)
    }

    /// Indexes still to upload, in order.
    pub(crate) fn pending_chunks(&self) -> Vec<usize> {
        self.done
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, done)| !**done)
            .map(|(index, _)| index)
            .collect()
    }

    pub(crate) fn chunk_data(&self, index: usize) -> Vec<u8> {
        let start = index * self.chunk_size;
        let end = (start + self.chunk_size).min(self.data.len());
        self.data[start..end].to_vec()
    }

    pub(crate) fn mark_done(&self, index: usize, bytes: u64) {
        let mut done = self.done.lock();
        if !done[index] {
            done[index] = true;
            let total = self.bytes_transferred.fetch_add(bytes, Ordering::AcqRel) + bytes;
            self.speed_samples.lock().push_back((Instant::now(), total));
        }
    }

    /// Requests cancellation; in-flight and pending chunks abort.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn cancelled_error(&self) -> ServiceError {
        ServiceError::Unknown {
            context: Box::new(
                ErrorContext::builder("upload", self.id())
                    .method("POST")
                    .build(),
            ),
            message: "upload cancelled".into(),
        }
    }

    /// Rolling progress: bytes, total, speed over the recent window, ETA.
    pub fn progress(&self) -> UploadProgress {
        let bytes = self.bytes_transferred();
        let total = self.total_size();
        let speed = {
            let mut samples = self.speed_samples.lock();
            let now = Instant::now();
            while let Some((at, _)) = samples.front() {
                if now.duration_since(*at) > SPEED_WINDOW {
                    samples.pop_front();
                } else {
                    break;
                }
            }
            match (samples.front(), samples.back()) {
                (Some((first_at, first_bytes)), Some((last_at, last_bytes)))
                    if last_at > first_at =>
                {
                    (*last_bytes - *first_bytes) as f64
                        / last_at.duration_since(*first_at).as_secs_f64()
                }
                _ => {
                    let elapsed = self.started_at.elapsed().as_secs_f64();
                    if elapsed > 0.0 {
                        bytes as f64 / elapsed
                    } else {
                        0.0
                    }
                }
            }
        };
        let eta = if speed > 0.0 && total > bytes {
            Some(Duration::from_secs_f64((total - bytes) as f64 / speed))
        } else {
            None
        };
        UploadProgress {
            bytes_uploaded: bytes,
            total_bytes: total,
            speed_bytes_per_sec: speed,
            eta,
        }
    }

    pub fn snapshot(&self) -> UploadSessionSnapshot {
        UploadSessionSnapshot {
            session_id: self.id.clone(),
            total_size: self.total_size(),
            chunk_size: self.chunk_size,
            chunks_done: self.chunks_done(),
            total_chunks: self.total_chunks(),
            bytes_transferred: self.bytes_transferred(),
            cancelled: self.is_cancelled(),
        }
    }
}
