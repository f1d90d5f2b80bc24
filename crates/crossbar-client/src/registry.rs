use crate::config::CrossbarConfig;
use crossbar_bulkhead::{Bulkhead, BulkheadConfig, BulkheadSnapshot};
use crossbar_circuitbreaker::{CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot};
use crossbar_ratelimiter::{RateLimiter, RateLimiterConfig, RateLimiterSnapshot};
use crossbar_timeout::{AdaptiveTimeout, AdaptiveTimeoutConfig, AdaptiveTimeoutSnapshot};
use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// The per-service policy bundle the pipeline consults on every attempt.
pub struct ServicePolicies {
    pub circuit: Arc<CircuitBreaker>,
    pub bulkhead: Arc<Bulkhead>,
    pub limiter: Arc<RateLimiter>,
    pub timeout: Arc<AdaptiveTimeout>,
}

/// Immutable observability record for one service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSnapshot {
    pub service: String,
    pub circuit: CircuitSnapshot,
    pub bulkhead: BulkheadSnapshot,
    pub rate_limiter: RateLimiterSnapshot,
    pub adaptive_timeout: AdaptiveTimeoutSnapshot,
}

/// Lazily creates and owns one policy bundle per service name.
///
/// Bundles live for the process lifetime; `reset` clears accumulated state
/// but keeps the instances so held references stay valid.
pub struct PolicyRegistry {
    config: CrossbarConfig,
    services: RwLock<HashMap<String, Arc<ServicePolicies>>>,
}

impl PolicyRegistry {
    pub fn new(config: CrossbarConfig) -> Self {
        Self {
            config,
            services: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_create(&self, service: &str) -> Arc<ServicePolicies> {
        if let Some(found) = self.services.read().get(service) {
            return Arc::clone(found);
        }
        let mut services = self.services.write();
        Arc::clone(
            services
                .entry(service.to_string())
                .or_insert_with(|| Arc::new(self.build_policies(service))),
        )
    }

    fn build_policies(&self, service: &str) -> ServicePolicies {
        let c = &self.config;
        let mut circuit = CircuitBreakerConfig::builder()
            .failure_rate_threshold(c.circuit.failure_rate_threshold / 100.0)
            .sliding_window_size(c.circuit.sliding_window_size)
            .minimum_number_of_calls(c.circuit.minimum_number_of_calls)
            .wait_duration_in_open(Duration::from_millis(c.circuit.wait_duration_in_open_ms))
            .permitted_probes(c.circuit.permitted_probes)
            .name(service);
        if let Some(threshold_ms) = c.circuit.slow_call_threshold_ms {
            circuit = circuit.slow_call_threshold(Duration::from_millis(threshold_ms));
        }

        ServicePolicies {
            circuit: circuit.build(),
            bulkhead: BulkheadConfig::builder()
                .max_concurrent(c.bulkhead.max_concurrent)
                .max_wait(Duration::from_millis(c.bulkhead.max_wait_ms))
                .name(service)
                .build(),
            limiter: RateLimiterConfig::builder()
                .requests_per_second(c.rate_limit.rps)
                .burst_capacity(c.rate_limit.burst)
                .name(service)
                .build(),
            timeout: AdaptiveTimeoutConfig::builder()
                .base_timeout(c.attempt_base_timeout())
                .max_timeout(c.attempt_max_timeout())
                .name(service)
                .build(),
        }
    }

    pub fn get(&self, service: &str) -> Option<Arc<ServicePolicies>> {
        self.services.read().get(service).cloned()
    }

    /// Clears circuit and timeout state for one service.
    pub fn reset(&self, service: &str) -> bool {
        match self.services.read().get(service) {
            Some(policies) => {
                policies.circuit.reset();
                policies.timeout.reset();
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self, service: &str) -> Option<ServiceSnapshot> {
        self.services.read().get(service).map(|policies| ServiceSnapshot {
            service: service.to_string(),
            circuit: policies.circuit.snapshot(),
            bulkhead: policies.bulkhead.snapshot(),
            rate_limiter: policies.limiter.snapshot(),
            adaptive_timeout: policies.timeout.snapshot(),
        })
    }

    pub fn snapshot_all(&self) -> Vec<ServiceSnapshot> {
        let services: Vec<String> = self.services.read().keys().cloned().collect();
        services
            .into_iter()
            .filter_map(|name| self.snapshot(&name))
            .collect()
    }
}
