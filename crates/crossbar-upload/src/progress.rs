use std::sync::Arc;
use std::time::Duration;

/// One progress report, delivered after each finished chunk.
#[derive(Debug, Clone)]
pub struct UploadProgress {
    pub bytes_uploaded: u64,
    pub total_bytes: u64,
    /// Rolling estimate over the recent window.
    pub speed_bytes_per_sec: f64,
    /// Remaining time at the current speed; `None` until a speed exists.
    pub eta: Option<Duration>,
}

impl UploadProgress {
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes_uploaded as f64 / self.total_bytes as f64
        }
    }
}

/// Callback invoked with progress updates. Runs on the uploader's task;
/// implementations hand off to their own executor for anything slow.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;
