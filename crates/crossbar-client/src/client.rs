use crate::config::CrossbarConfig;
use crate::pipeline::PipelineShared;
use crate::registry::{PolicyRegistry, ServiceSnapshot};
use crate::stream::StreamHandle;
use crate::transport::Transport;
use crossbar_core::{ErrorContext, Protocol, Request, Response, ServiceError};
use crossbar_interceptor::{Interceptor, InterceptorChain};
use crossbar_loadshed::{LoadShedConfig, ProcessStatsSource};
use crossbar_retry::RetryPolicy;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

struct ClientState {
    accepting: AtomicBool,
    in_flight: AtomicUsize,
    cancel_all: CancellationToken,
}

/// A configured client for one protocol family.
///
/// Cloning is cheap and shares all policy state.
#[derive(Clone)]
pub struct Client {
    protocol: Protocol,
    shared: Arc<PipelineShared>,
    state: Arc<ClientState>,
}

impl Client {
    /// Executes a unary call through the full pipeline.
    pub async fn execute(&self, request: Request) -> Result<Response, ServiceError> {
        self.execute_with_cancel(request, self.state.cancel_all.child_token())
            .await
    }

    /// Executes with a caller-owned cancellation token.
    pub async fn execute_with_cancel(
        &self,
        request: Request,
        cancel: CancellationToken,
    ) -> Result<Response, ServiceError> {
        self.check_accepting(&request)?;
        let _guard = InFlightGuard::enter(&self.state);
        self.shared.execute(request, cancel).await
    }

    /// Opens a stream; all gate policies apply to the opening. Dropping the
    /// returned handle cancels the upstream call.
    pub async fn execute_stream(&self, request: Request) -> Result<StreamHandle, ServiceError> {
        self.check_accepting(&request)?;
        let _guard = InFlightGuard::enter(&self.state);
        self.shared
            .execute_stream(request, self.state.cancel_all.child_token())
            .await
    }

    fn check_accepting(&self, request: &Request) -> Result<(), ServiceError> {
        if self.state.accepting.load(Ordering::Acquire) {
            return Ok(());
        }
        Err(ServiceError::Configuration {
            context: Box::new(
                ErrorContext::builder(request.service(), request.endpoint())
                    .method(request.method())
                    .protocol(request.protocol())
                    .request_id(request.request_id())
                    .build(),
            ),
            message: "client is shut down".into(),
        })
    }

    /// Liveness of the client itself: `Ok` while it accepts calls.
    pub fn health_check(&self) -> Result<(), ServiceError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(ServiceError::Configuration {
                context: Box::new(ErrorContext::builder("<client>", "health").build()),
                message: "client is shut down".into(),
            })
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state.accepting.load(Ordering::Acquire)
            && !self.state.cancel_all.is_cancelled()
    }

    /// Stops accepting new calls, waits up to `grace` for in-flight calls
    /// to drain, then cancels whatever remains.
    pub async fn shutdown(&self, grace: Duration) {
        self.state.accepting.store(false, Ordering::Release);
        let deadline = Instant::now() + grace;
        while self.state.in_flight.load(Ordering::Acquire) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.state.cancel_all.cancel();
        tracing::info!(
            abandoned = self.state.in_flight.load(Ordering::Acquire),
            "client shut down"
        );
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// The raw transport underneath the pipeline. Calls made directly
    /// against it bypass every policy by contract; intended for advanced
    /// callers that must escape the gate stack.
    pub fn raw_transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.shared.transport)
    }

    pub fn in_flight(&self) -> usize {
        self.state.in_flight.load(Ordering::Acquire)
    }

    /// Per-service policy snapshot, or `None` before first use.
    pub fn service_snapshot(&self, service: &str) -> Option<ServiceSnapshot> {
        self.shared.registry.snapshot(service)
    }

    pub fn snapshot_all(&self) -> Vec<ServiceSnapshot> {
        self.shared.registry.snapshot_all()
    }

    pub fn shed_snapshot(&self) -> crossbar_loadshed::LoadShedSnapshot {
        self.shared.shedder.snapshot()
    }

    /// Clears circuit and adaptive-timeout state for one service.
    pub fn reset_service(&self, service: &str) -> bool {
        self.shared.registry.reset(service)
    }

    /// Builder for a REST client.
    pub fn rest() -> ClientBuilder {
        ClientBuilder::new(Protocol::Rest)
    }

    /// Builder for a gRPC client.
    pub fn grpc() -> ClientBuilder {
        ClientBuilder::new(Protocol::Grpc)
    }

    /// Builder for a SOAP client.
    pub fn soap() -> ClientBuilder {
        ClientBuilder::new(Protocol::Soap)
    }
}

struct InFlightGuard {
    state: Arc<ClientState>,
}

impl InFlightGuard {
    fn enter(state: &Arc<ClientState>) -> Self {
        state.in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            state: Arc::clone(state),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.state.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Builder for [`Client`]. Interceptors register here, once, in priority
/// order; there is no runtime plugin discovery.
pub struct ClientBuilder {
    protocol: Protocol,
    config: CrossbarConfig,
    transport: Option<Arc<dyn Transport>>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    stats_source: Option<Arc<dyn ProcessStatsSource>>,
}

impl ClientBuilder {
    fn new(protocol: Protocol) -> Self {
        Self {
            protocol,
            config: CrossbarConfig::default(),
            transport: None,
            interceptors: Vec::new(),
            stats_source: None,
        }
    }

    pub fn config(mut self, config: CrossbarConfig) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Registers an interceptor; ordering comes from its `priority()`.
    pub fn interceptor(mut self, interceptor: impl Interceptor + 'static) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    /// Process gauges for the load shedder. Defaults to a source that
    /// reports nothing.
    pub fn stats_source(mut self, source: Arc<dyn ProcessStatsSource>) -> Self {
        self.stats_source = Some(source);
        self
    }

    pub fn build(self) -> Result<Client, ServiceError> {
        let transport = self.transport.ok_or_else(|| ServiceError::Configuration {
            context: Box::new(ErrorContext::builder("<client>", "build").build()),
            message: "a transport is required".into(),
        })?;

        let config = self.config;
        let mut shed = LoadShedConfig::builder()
            .cpu_limit(config.load_shed.cpu)
            .mem_limit(config.load_shed.mem)
            .thread_limit(config.load_shed.threads)
            .service_rps_limit(config.load_shed.rps)
            .service_latency_limit(Duration::from_millis(config.load_shed.latency_ms));
        if let Some(source) = self.stats_source {
            shed = shed.stats_source(source);
        }

        let retry = RetryPolicy::builder()
            .max_attempts(config.retry.max_attempts)
            .base_backoff(Duration::from_millis(config.retry.base_backoff_ms))
            .max_backoff(Duration::from_millis(config.retry.max_backoff_ms))
            .jitter(config.retry.jitter)
            .name("pipeline")
            .build();

        let shared = Arc::new(PipelineShared {
            transport,
            chain: InterceptorChain::new(self.interceptors),
            registry: PolicyRegistry::new(config),
            shedder: shed.build(),
            retry,
        });

        Ok(Client {
            protocol: self.protocol,
            shared,
            state: Arc::new(ClientState {
                accepting: AtomicBool::new(true),
                in_flight: AtomicUsize::new(0),
                cancel_all: CancellationToken::new(),
            }),
        })
    }
}
