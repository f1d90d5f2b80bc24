//! Process gauge inputs.

/// One observation of process health.
///
/// Utilization fields are fractions in `[0, 1]`. Hosts without a meaningful
/// value for a field report zero, which can never shed.
#[derive(Debug, Clone, Default)]
pub struct ProcessSample {
    pub cpu: f64,
    pub heap_utilization: f64,
    pub non_heap_utilization: f64,
    pub thread_pool_utilization: f64,
    pub total_threads: usize,
    pub cores: usize,
    /// Collector time over process uptime, for managed-runtime hosts.
    pub gc_time_ratio: f64,
    pub gc_count: u64,
}

/// Supplies process gauges to the shedder.
pub trait ProcessStatsSource: Send + Sync {
    fn sample(&self) -> ProcessSample;
}

/// Reports nothing; process-level signals never shed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStatsSource;

impl ProcessStatsSource for NullStatsSource {
    fn sample(&self) -> ProcessSample {
        ProcessSample::default()
    }
}
