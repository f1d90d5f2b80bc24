use crate::chain::{InterceptFuture, Interceptor, Next};
use crossbar_core::{mask_header_value, HeaderMap, Request};

/// How much of each call the logging interceptor records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// Log nothing.
    None,
    /// Method, endpoint, status and elapsed time.
    Basic,
    /// Basic plus headers, with sensitive names masked.
    Headers,
    /// Headers plus truncated bodies.
    Full,
}

/// Logs requests and outcomes through `tracing`.
///
/// Sensitive header values are masked unconditionally; bodies are truncated
/// at a configured byte length before they reach the log record.
pub struct LoggingInterceptor {
    verbosity: Verbosity,
    max_body_bytes: usize,
    priority: i32,
}

impl LoggingInterceptor {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            max_body_bytes: 1024,
            priority: -100,
        }
    }

    /// Truncation length for logged bodies. Default: 1024 bytes.
    pub fn max_body_bytes(mut self, n: usize) -> Self {
        self.max_body_bytes = n;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    fn render_headers(headers: &HeaderMap) -> String {
        headers
            .iter()
            .map(|(name, value)| format!("{name}={}", mask_header_value(name, value)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn render_body(&self, body: &[u8]) -> String {
        let cut = body.len().min(self.max_body_bytes);
        let mut text = String::from_utf8_lossy(&body[..cut]).into_owned();
        if body.len() > cut {
            text.push_str("…");
        }
        text
    }
}

impl Interceptor for LoggingInterceptor {
    fn priority(&self) -> i32 {
        self.priority
    }

    fn name(&self) -> &str {
        "logging"
    }

    fn intercept(&self, request: Request, next: Next) -> InterceptFuture {
        if self.verbosity == Verbosity::None {
            return next.run(request);
        }

        let verbosity = self.verbosity;
        let max_body = self.max_body_bytes;
        let service = request.service().to_string();
        let endpoint = request.endpoint().to_string();
        let method = request.method().to_string();
        let request_id = request.request_id().to_string();

        if verbosity >= Verbosity::Headers {
            tracing::debug!(
                %service, %method, %endpoint, %request_id,
                headers = %Self::render_headers(request.headers()),
                "request"
            );
            if verbosity == Verbosity::Full {
                if let Some(body) = request.body() {
                    tracing::debug!(
                        %service, %request_id,
                        body = %self.render_body(body.bytes()),
                        "request body"
                    );
                }
            }
        } else {
            tracing::debug!(%service, %method, %endpoint, %request_id, "request");
        }

        Box::pin(async move {
            let result = next.run(request).await;
            match &result {
                Ok(response) => {
                    tracing::debug!(
                        %service, %method, %endpoint, %request_id,
                        status = response.status(),
                        elapsed_ms = response.elapsed().as_millis() as u64,
                        "response"
                    );
                    if verbosity >= Verbosity::Headers {
                        tracing::debug!(
                            %service, %request_id,
                            headers = %Self::render_headers(response.headers()),
                            "response headers"
                        );
                    }
                    if verbosity == Verbosity::Full && !response.body().is_empty() {
                        let cut = response.body().len().min(max_body);
                        tracing::debug!(
                            %service, %request_id,
                            body = %String::from_utf8_lossy(&response.body()[..cut]),
                            "response body"
                        );
                    }
                }
                Err(error) => {
                    tracing::warn!(
                        %service, %method, %endpoint, %request_id,
                        category = %error.category(),
                        "call failed: {error}"
                    );
                }
            }
            result
        })
    }
}
