//! The attempt loop and its gate stack.

use crate::registry::{PolicyRegistry, ServicePolicies};
use crate::stream::StreamHandle;
use crate::transport::{Transport, TransportError};
use crossbar_bulkhead::BulkheadPermit;
use crossbar_circuitbreaker::CircuitPermit;
use crossbar_core::{
    map_grpc, map_http, map_soap_fault, ErrorContext, HeaderMap, Request, Response, Retryable,
    ServiceError,
};
use crossbar_interceptor::{InterceptorChain, Terminal};
use crossbar_loadshed::LoadShedder;
use crossbar_retry::{RetryDecision, RetryPolicy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Headers worth carrying into an error context, masked elsewhere if
/// sensitive (none of these are).
const DIAGNOSTIC_HEADERS: &[&str] = &["content-type", "x-request-id", "retry-after"];

/// Everything an attempt needs, shared by unary and streaming calls.
pub(crate) struct PipelineShared {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) chain: InterceptorChain,
    pub(crate) registry: PolicyRegistry,
    pub(crate) shedder: Arc<LoadShedder>,
    pub(crate) retry: RetryPolicy,
}

pub(crate) fn context_for(request: &Request, attempt: u32, elapsed: Duration) -> ErrorContext {
    let mut builder = ErrorContext::builder(request.service(), request.endpoint())
        .method(request.method())
        .protocol(request.protocol())
        .request_id(request.request_id())
        .retry_attempt(attempt)
        .elapsed(elapsed);
    if let Some(correlation_id) = request.correlation_id() {
        builder = builder.correlation_id(correlation_id);
    }
    builder.build()
}

fn select_headers(headers: &HeaderMap) -> HeaderMap {
    DIAGNOSTIC_HEADERS
        .iter()
        .filter_map(|name| headers.get(name).map(|value| (*name, value)))
        .collect()
}

/// Whether the breaker should treat this error as a downstream failure.
/// Client-side outcomes (validation, auth, not-found, throttling) mean the
/// downstream answered; they leave the circuit alone.
fn is_circuit_failure(error: &ServiceError) -> bool {
    use crossbar_core::ErrorCategory;
    matches!(
        error.category(),
        ErrorCategory::Server | ErrorCategory::Network | ErrorCategory::Timeout
    )
}

pub(crate) fn map_transport_error(error: TransportError, ctx: ErrorContext) -> ServiceError {
    match error {
        TransportError::Io { message } => ServiceError::Connection {
            context: Box::new(ctx),
            message,
        },
        TransportError::Grpc { status, message } => map_grpc(status, message, ctx),
        TransportError::SoapFault {
            fault_code,
            fault_string,
        } => map_soap_fault(fault_code, fault_string, ctx),
        TransportError::Serialization { message } => ServiceError::Serialization {
            context: Box::new(ctx),
            message,
        },
        TransportError::StreamingUnsupported => ServiceError::Configuration {
            context: Box::new(ctx),
            message: "transport does not support streaming".into(),
        },
    }
}

struct Gates {
    policies: Arc<ServicePolicies>,
    permit: CircuitPermit,
    _slot: BulkheadPermit,
    started: Instant,
}

impl PipelineShared {
    /// Gate steps 2–5, in order; any rejection skips every later gate.
    async fn acquire_gates(
        &self,
        request: &Request,
        attempt: u32,
    ) -> Result<Gates, ServiceError> {
        let service = request.service();
        let started = Instant::now();

        if let Some(reason) = self.shedder.check(service) {
            return Err(ServiceError::LoadShed {
                context: Box::new(context_for(request, attempt, started.elapsed())),
                reason: reason.to_string(),
            });
        }
        self.shedder.record_arrival(service);

        let policies = self.registry.get_or_create(service);

        if !policies.limiter.try_acquire() {
            return Err(ServiceError::RateLimit {
                context: Box::new(context_for(request, attempt, started.elapsed())),
                message: "client-side rate limit exceeded".into(),
                retry_after: None,
            });
        }

        let slot = match policies.bulkhead.acquire().await {
            Ok(slot) => slot,
            Err(_full) => {
                return Err(ServiceError::BulkheadFull {
                    context: Box::new(context_for(request, attempt, started.elapsed())),
                });
            }
        };

        let permit = match policies.circuit.try_acquire() {
            Ok(permit) => permit,
            Err(_open) => {
                return Err(ServiceError::CircuitBreakerOpen {
                    context: Box::new(context_for(request, attempt, started.elapsed())),
                });
            }
        };

        Ok(Gates {
            policies,
            permit,
            _slot: slot,
            started,
        })
    }

    /// The per-attempt deadline: a caller-supplied timeout wins over the
    /// adaptive one, and whatever remains of the call deadline caps both.
    fn attempt_timeout(
        &self,
        request: &Request,
        policies: &ServicePolicies,
        call_deadline: Option<Instant>,
    ) -> Duration {
        let mut timeout = request
            .timeout()
            .unwrap_or_else(|| policies.timeout.current_timeout());
        if let Some(deadline) = call_deadline {
            timeout = timeout.min(deadline.saturating_duration_since(Instant::now()));
        }
        timeout
    }

    /// One transport attempt behind the full gate stack (steps 2–8).
    async fn attempt_unary(
        self: &Arc<Self>,
        request: Request,
        attempt: u32,
        call_deadline: Option<Instant>,
        cancel: CancellationToken,
    ) -> Result<Response, ServiceError> {
        let service = request.service().to_string();
        let gates = self.acquire_gates(&request, attempt).await?;
        let Gates {
            policies,
            permit,
            _slot,
            started,
        } = gates;

        let timeout = self.attempt_timeout(&request, &policies, call_deadline);
        if timeout.is_zero() {
            permit.cancel();
            return Err(ServiceError::Timeout {
                context: Box::new(context_for(&request, attempt, started.elapsed())),
                message: "call deadline exhausted before attempt".into(),
            });
        }
        let attempt_deadline = Instant::now() + timeout;

        let send = self
            .transport
            .send(request.clone(), attempt_deadline, cancel.child_token());
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, send) => Some(result),
            _ = cancel.cancelled() => None,
        };
        let elapsed = started.elapsed();

        match outcome {
            // Cancellation: release everything, record nothing.
            None => {
                permit.cancel();
                Err(ServiceError::Unknown {
                    context: Box::new(context_for(&request, attempt, elapsed)),
                    message: "call cancelled".into(),
                })
            }
            // Attempt deadline expired.
            Some(Err(_)) => {
                permit.record_failure(elapsed);
                policies.timeout.record_failure();
                self.shedder.record_response(&service, elapsed, true);
                Err(ServiceError::Timeout {
                    context: Box::new(context_for(&request, attempt, elapsed)),
                    message: format!("attempt timed out after {}ms", timeout.as_millis()),
                })
            }
            Some(Ok(Ok(raw))) => {
                if raw.status >= 400 {
                    let ctx = {
                        let mut c = context_for(&request, attempt, elapsed);
                        c.headers = select_headers(&raw.headers);
                        c
                    };
                    let error = map_http(raw.status, &raw.body, &raw.headers, ctx);
                    if is_circuit_failure(&error) {
                        permit.record_failure(elapsed);
                        policies.timeout.record_failure();
                    } else {
                        // The downstream answered; a 4xx is its success.
                        permit.record_success(elapsed);
                        policies.timeout.record_success(elapsed);
                    }
                    self.shedder.record_response(&service, elapsed, true);
                    Err(error)
                } else {
                    permit.record_success(elapsed);
                    policies.timeout.record_success(elapsed);
                    self.shedder.record_response(&service, elapsed, false);
                    Ok(Response::new(raw.status, raw.body, raw.headers, elapsed))
                }
            }
            Some(Ok(Err(transport_error))) => {
                let error =
                    map_transport_error(transport_error, context_for(&request, attempt, elapsed));
                if is_circuit_failure(&error) {
                    permit.record_failure(elapsed);
                    policies.timeout.record_failure();
                } else {
                    permit.record_success(elapsed);
                    policies.timeout.record_success(elapsed);
                }
                self.shedder.record_response(&service, elapsed, true);
                Err(error)
            }
        }
    }

    /// Full call: interceptors wrap each attempt, the retry policy decides
    /// re-entry. Load-shed rejections wait out their own suggested delay
    /// without consuming a backoff slot (bounded separately so a saturated
    /// host still terminates).
    pub(crate) async fn execute(
        self: &Arc<Self>,
        request: Request,
        cancel: CancellationToken,
    ) -> Result<Response, ServiceError> {
        let call_start = Instant::now();
        let call_deadline = request.timeout().map(|t| call_start + t);
        let mut attempt: u32 = 0;
        let mut shed_rounds: u32 = 0;

        loop {
            let terminal = self.unary_terminal(attempt, call_deadline, cancel.clone());
            let result = self.chain.execute(request.clone(), terminal).await;

            let error = match result {
                Ok(response) => return Ok(response.with_elapsed(call_start.elapsed())),
                Err(error) => error.with_attempt(attempt),
            };

            if cancel.is_cancelled() {
                return Err(error);
            }

            // A shed call is not an attempt against the downstream: wait the
            // shed delay and re-enter without touching the backoff schedule.
            if matches!(error, ServiceError::LoadShed { .. })
                && shed_rounds + 1 < self.retry.max_attempts()
            {
                shed_rounds += 1;
                let delay = error.suggested_delay().unwrap_or(Duration::from_secs(3));
                if !self.wait(delay, call_deadline, &cancel).await {
                    return Err(error);
                }
                continue;
            }

            match self.retry.decide(&error, attempt, call_deadline) {
                RetryDecision::Retry { delay } => {
                    if !self.wait(delay, call_deadline, &cancel).await {
                        return Err(error);
                    }
                    attempt += 1;
                }
                RetryDecision::Abort => return Err(error),
            }
        }
    }

    /// Sleeps `delay`; false when the deadline or cancellation preempts it.
    async fn wait(
        &self,
        delay: Duration,
        call_deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> bool {
        if let Some(deadline) = call_deadline {
            if deadline.saturating_duration_since(Instant::now()) < delay {
                return false;
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }

    fn unary_terminal(
        self: &Arc<Self>,
        attempt: u32,
        call_deadline: Option<Instant>,
        cancel: CancellationToken,
    ) -> Terminal {
        let shared = Arc::clone(self);
        Arc::new(move |request: Request| {
            let shared = Arc::clone(&shared);
            let cancel = cancel.clone();
            Box::pin(async move {
                shared
                    .attempt_unary(request, attempt, call_deadline, cancel)
                    .await
            })
        })
    }

    /// Opens a stream through the same gates and retry loop as a unary
    /// call; only the transport invocation differs. Dropping the returned
    /// handle cancels the upstream via the per-call token.
    pub(crate) async fn execute_stream(
        self: &Arc<Self>,
        request: Request,
        cancel: CancellationToken,
    ) -> Result<StreamHandle, ServiceError> {
        let call_start = Instant::now();
        let call_deadline = request.timeout().map(|t| call_start + t);
        let mut attempt: u32 = 0;

        loop {
            match self
                .attempt_stream(&request, attempt, call_deadline, &cancel)
                .await
            {
                Ok(handle) => return Ok(handle),
                Err(error) => {
                    let error = error.with_attempt(attempt);
                    match self.retry.decide(&error, attempt, call_deadline) {
                        RetryDecision::Retry { delay } => {
                            if !self.wait(delay, call_deadline, &cancel).await {
                                return Err(error);
                            }
                            attempt += 1;
                        }
                        RetryDecision::Abort => return Err(error),
                    }
                }
            }
        }
    }

    async fn attempt_stream(
        self: &Arc<Self>,
        request: &Request,
        attempt: u32,
        call_deadline: Option<Instant>,
        cancel: &CancellationToken,
    ) -> Result<StreamHandle, ServiceError> {
        let service = request.service().to_string();
        let gates = self.acquire_gates(request, attempt).await?;
        let Gates {
            policies,
            permit,
            _slot,
            started,
        } = gates;

        let timeout = self.attempt_timeout(request, &policies, call_deadline);
        let attempt_deadline = Instant::now() + timeout;
        let stream_cancel = cancel.child_token();

        let open = self
            .transport
            .open_stream(request.clone(), attempt_deadline, stream_cancel.clone());
        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, open) => Some(result),
            _ = cancel.cancelled() => None,
        };
        let elapsed = started.elapsed();

        match outcome {
            None => {
                permit.cancel();
                Err(ServiceError::Unknown {
                    context: Box::new(context_for(request, attempt, elapsed)),
                    message: "call cancelled".into(),
                })
            }
            Some(Err(_)) => {
                permit.record_failure(elapsed);
                policies.timeout.record_failure();
                self.shedder.record_response(&service, elapsed, true);
                Err(ServiceError::Timeout {
                    context: Box::new(context_for(request, attempt, elapsed)),
                    message: format!("stream open timed out after {}ms", timeout.as_millis()),
                })
            }
            Some(Ok(Ok(raw_stream))) => {
                permit.record_success(elapsed);
                policies.timeout.record_success(elapsed);
                self.shedder.record_response(&service, elapsed, false);
                Ok(StreamHandle::new(
                    raw_stream.items,
                    stream_cancel,
                    context_for(request, attempt, elapsed),
                ))
            }
            Some(Ok(Err(transport_error))) => {
                let error =
                    map_transport_error(transport_error, context_for(request, attempt, elapsed));
                if is_circuit_failure(&error) {
                    permit.record_failure(elapsed);
                    policies.timeout.record_failure();
                } else {
                    permit.record_success(elapsed);
                    policies.timeout.record_success(elapsed);
                }
                self.shedder.record_response(&service, elapsed, true);
                Err(error)
            }
        }
    }
}
