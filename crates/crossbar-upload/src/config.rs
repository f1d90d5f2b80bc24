use crossbar_retry::RetryPolicy;
use std::collections::HashSet;
use std::time::Duration;

/// Tuning and validation limits for the uploader.
pub struct UploadConfig {
    pub(crate) chunk_size: usize,
    pub(crate) max_parallel: usize,
    pub(crate) max_file_size: Option<u64>,
    pub(crate) allowed_mime_types: Option<HashSet<String>>,
    pub(crate) allowed_extensions: Option<HashSet<String>>,
    pub(crate) retry: RetryPolicy,
}

impl UploadConfig {
    pub fn builder() -> UploadConfigBuilder {
        UploadConfigBuilder::new()
    }
}

/// Builder for [`UploadConfig`].
pub struct UploadConfigBuilder {
    chunk_size: usize,
    max_parallel: usize,
    max_file_size: Option<u64>,
    allowed_mime_types: Option<HashSet<String>>,
    allowed_extensions: Option<HashSet<String>>,
    retry: Option<RetryPolicy>,
}

impl UploadConfigBuilder {
    pub fn new() -> Self {
        Self {
            chunk_size: 5 * 1024 * 1024,
            max_parallel: 4,
            max_file_size: None,
            allowed_mime_types: None,
            allowed_extensions: None,
            retry: None,
        }
    }

    /// Bytes per chunk.
    ///
    /// Default: 5 MiB
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Chunks in flight at once.
    ///
    /// Default: 4
    pub fn max_parallel(mut self, parallel: usize) -> Self {
        self.max_parallel = parallel.max(1);
        self
    }

    /// Ceiling on the input size; violations fail validation.
    ///
    /// Default: unlimited
    pub fn max_file_size(mut self, max: u64) -> Self {
        self.max_file_size = Some(max);
        self
    }

    /// Allowed content types (case-insensitive). Unset allows everything.
    pub fn allowed_mime_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_mime_types = Some(
            types
                .into_iter()
                .map(|t| t.into().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    /// Allowed file extensions, without the dot (case-insensitive). Unset
    /// allows everything.
    pub fn allowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_extensions = Some(
            extensions
                .into_iter()
                .map(|e| e.into().to_ascii_lowercase())
                .collect(),
        );
        self
    }

    /// Per-chunk retry policy.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> UploadConfig {
        UploadConfig {
            chunk_size: self.chunk_size,
            max_parallel: self.max_parallel,
            max_file_size: self.max_file_size,
            allowed_mime_types: self.allowed_mime_types,
            allowed_extensions: self.allowed_extensions,
            retry: self.retry.unwrap_or_else(|| {
                RetryPolicy::builder()
                    .max_attempts(3)
                    .base_backoff(Duration::from_millis(500))
                    .name("upload")
                    .build()
            }),
        }
    }
}

impl Default for UploadConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
