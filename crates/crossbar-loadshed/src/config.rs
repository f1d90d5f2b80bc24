use crate::stats::{NullStatsSource, ProcessStatsSource};
use crate::LoadShedder;
use std::sync::Arc;
use std::time::Duration;

/// Thresholds for the shedder.
pub struct LoadShedConfig {
    pub(crate) cpu_limit: f64,
    pub(crate) mem_limit: f64,
    pub(crate) thread_limit: f64,
    pub(crate) service_rps_limit: f64,
    pub(crate) service_latency_limit: Duration,
}

impl LoadShedConfig {
    pub fn builder() -> LoadShedConfigBuilder {
        LoadShedConfigBuilder::new()
    }
}

/// Builder for [`LoadShedder`].
pub struct LoadShedConfigBuilder {
    cpu_limit: f64,
    mem_limit: f64,
    thread_limit: f64,
    service_rps_limit: f64,
    service_latency_limit: Duration,
    source: Arc<dyn ProcessStatsSource>,
}

impl LoadShedConfigBuilder {
    pub fn new() -> Self {
        Self {
            cpu_limit: 0.9,
            mem_limit: 0.9,
            thread_limit: 0.9,
            service_rps_limit: f64::INFINITY,
            service_latency_limit: Duration::from_secs(10),
            source: Arc::new(NullStatsSource),
        }
    }

    /// CPU EWMA above this sheds. Default: 0.9
    pub fn cpu_limit(mut self, limit: f64) -> Self {
        self.cpu_limit = limit;
        self
    }

    /// Heap utilization above this sheds. Default: 0.9
    pub fn mem_limit(mut self, limit: f64) -> Self {
        self.mem_limit = limit;
        self
    }

    /// Thread-pool utilization above this sheds. Default: 0.9
    pub fn thread_limit(mut self, limit: f64) -> Self {
        self.thread_limit = limit;
        self
    }

    /// Observed per-service request rate above this sheds.
    ///
    /// Default: unlimited
    pub fn service_rps_limit(mut self, limit: f64) -> Self {
        self.service_rps_limit = limit;
        self
    }

    /// Mean per-service latency above this sheds. Default: 10 seconds
    pub fn service_latency_limit(mut self, limit: Duration) -> Self {
        self.service_latency_limit = limit;
        self
    }

    /// Where process gauges come from. Default: a null source that never
    /// sheds on process signals.
    pub fn stats_source(mut self, source: Arc<dyn ProcessStatsSource>) -> Self {
        self.source = source;
        self
    }

    pub fn build(self) -> Arc<LoadShedder> {
        LoadShedder::new(
            LoadShedConfig {
                cpu_limit: self.cpu_limit,
                mem_limit: self.mem_limit,
                thread_limit: self.thread_limit,
                service_rps_limit: self.service_rps_limit,
                service_latency_limit: self.service_latency_limit,
            },
            self.source,
        )
    }
}

impl Default for LoadShedConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
