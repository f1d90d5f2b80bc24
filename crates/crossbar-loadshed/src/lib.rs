//! Multi-signal load shedding.
//!
//! Before a call is admitted, the shedder consults two families of signals:
//!
//! - **Process gauges** from a pluggable [`ProcessStatsSource`]: CPU (smoothed
//!   with an EWMA), heap and non-heap utilization, thread saturation and
//!   GC pressure. The default source reports nothing and so never sheds on
//!   process signals; hosts that can measure inject their own.
//! - **Per-service traffic windows**: observed request rate, mean latency and
//!   error rate over a rolling 60-second window.
//!
//! Any signal over its limit sheds the call. Shedding is advisory: the
//! pipeline converts it into a typed error, it never blocks.

mod config;
mod stats;
mod window;

pub use config::{LoadShedConfig, LoadShedConfigBuilder};
pub use stats::{NullStatsSource, ProcessSample, ProcessStatsSource};

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use window::ServiceWindow;

/// Smoothing factor for the CPU EWMA.
const CPU_EWMA_ALPHA: f64 = 0.3;
/// Minimum spacing between process-stat samples.
const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
/// Non-heap utilization above this sheds regardless of the heap limit.
const NON_HEAP_LIMIT: f64 = 0.95;
/// GC time over uptime above this sheds.
const GC_TIME_RATIO_LIMIT: f64 = 0.10;
/// Total GC count above this sheds.
const GC_COUNT_LIMIT: u64 = 1000;
/// Threads per core considered saturated.
const THREADS_PER_CORE_LIMIT: usize = 10;
/// Observed error rate above this sheds.
const ERROR_RATE_LIMIT: f64 = 0.5;

/// Why a call was shed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ShedReason {
    Cpu,
    Memory,
    Threads,
    GcPressure,
    ServiceRps,
    ServiceLatency,
    ServiceErrorRate,
}

impl fmt::Display for ShedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShedReason::Cpu => "cpu over limit",
            ShedReason::Memory => "memory over limit",
            ShedReason::Threads => "thread saturation",
            ShedReason::GcPressure => "gc pressure",
            ShedReason::ServiceRps => "service request rate over limit",
            ShedReason::ServiceLatency => "service latency over limit",
            ShedReason::ServiceErrorRate => "service error rate over limit",
        };
        f.write_str(s)
    }
}

/// Point-in-time view for the observability surface.
#[derive(Debug, Clone, Serialize)]
pub struct LoadShedSnapshot {
    pub cpu_limit: f64,
    pub mem_limit: f64,
    pub thread_limit: f64,
    pub service_rps_limit: f64,
    pub service_latency_limit_ms: u64,
    pub cpu_ewma: f64,
}

struct CpuState {
    ewma: Option<f64>,
    last_sample: Option<Instant>,
    last: ProcessSample,
}

/// The shedder. Shared process-wide via `Arc`.
pub struct LoadShedder {
    config: LoadShedConfig,
    source: Arc<dyn ProcessStatsSource>,
    cpu: Mutex<CpuState>,
    windows: Mutex<HashMap<String, ServiceWindow>>,
}

impl LoadShedder {
    pub(crate) fn new(config: LoadShedConfig, source: Arc<dyn ProcessStatsSource>) -> Arc<Self> {
        Arc::new(Self {
            config,
            source,
            cpu: Mutex::new(CpuState {
                ewma: None,
                last_sample: None,
                last: ProcessSample::default(),
            }),
            windows: Mutex::new(HashMap::new()),
        })
    }

    /// Admission check. `Some(reason)` means shed.
    pub fn check(&self, service: &str) -> Option<ShedReason> {
        let (cpu_ewma, sample) = self.sample_process();

        if cpu_ewma > self.config.cpu_limit {
            return self.shed(service, ShedReason::Cpu);
        }
        if sample.heap_utilization > self.config.mem_limit
            || sample.non_heap_utilization > NON_HEAP_LIMIT
        {
            return self.shed(service, ShedReason::Memory);
        }
        let thread_ceiling = sample.cores.max(1) * THREADS_PER_CORE_LIMIT;
        if sample.thread_pool_utilization > self.config.thread_limit
            || sample.total_threads > thread_ceiling
        {
            return self.shed(service, ShedReason::Threads);
        }
        if sample.gc_time_ratio > GC_TIME_RATIO_LIMIT || sample.gc_count > GC_COUNT_LIMIT {
            return self.shed(service, ShedReason::GcPressure);
        }

        let traffic_reason = {
            let mut windows = self.windows.lock();
            let window = windows
                .entry(service.to_string())
                .or_insert_with(ServiceWindow::new);
            window.roll_if_stale();

            if window.rps() > self.config.service_rps_limit {
                Some(ShedReason::ServiceRps)
            } else if window
                .mean_latency()
                .map(|mean| mean > self.config.service_latency_limit)
                .unwrap_or(false)
            {
                Some(ShedReason::ServiceLatency)
            } else if window.error_rate() > ERROR_RATE_LIMIT {
                Some(ShedReason::ServiceErrorRate)
            } else {
                None
            }
        };
        match traffic_reason {
            Some(reason) => self.shed(service, reason),
            None => None,
        }
    }

    fn shed(&self, service: &str, reason: ShedReason) -> Option<ShedReason> {
        tracing::warn!(service, %reason, "load shed");
        metrics::counter!(
            "loadshed_rejected_total",
            "service" => service.to_string(),
            "reason" => format!("{reason:?}")
        )
        .increment(1);
        Some(reason)
    }

    /// Records a request arrival for the service window.
    pub fn record_arrival(&self, service: &str) {
        let mut windows = self.windows.lock();
        let window = windows
            .entry(service.to_string())
            .or_insert_with(ServiceWindow::new);
        window.roll_if_stale();
        window.arrivals += 1;
    }

    /// Records a completed response for the service window.
    pub fn record_response(&self, service: &str, latency: Duration, is_error: bool) {
        let mut windows = self.windows.lock();
        let window = windows
            .entry(service.to_string())
            .or_insert_with(ServiceWindow::new);
        window.roll_if_stale();
        window.responses += 1;
        window.latency_sum += latency;
        if is_error {
            window.errors += 1;
        }
    }

    fn sample_process(&self) -> (f64, ProcessSample) {
        let mut cpu = self.cpu.lock();
        let now = Instant::now();
        let due = cpu
            .last_sample
            .map(|at| now.duration_since(at) >= SAMPLE_INTERVAL)
            .unwrap_or(true);
        if due {
            let sample = self.source.sample();
            let ewma = match cpu.ewma {
                Some(prev) => CPU_EWMA_ALPHA * sample.cpu + (1.0 - CPU_EWMA_ALPHA) * prev,
                None => sample.cpu,
            };
            cpu.ewma = Some(ewma);
            cpu.last_sample = Some(now);
            cpu.last = sample;
        }
        (cpu.ewma.unwrap_or(0.0), cpu.last.clone())
    }

    pub fn snapshot(&self) -> LoadShedSnapshot {
        let cpu = self.cpu.lock();
        LoadShedSnapshot {
            cpu_limit: self.config.cpu_limit,
            mem_limit: self.config.mem_limit,
            thread_limit: self.config.thread_limit,
            service_rps_limit: self.config.service_rps_limit,
            service_latency_limit_ms: self.config.service_latency_limit.as_millis() as u64,
            cpu_ewma: cpu.ewma.unwrap_or(0.0),
        }
    }

    /// Observed request rate for a service, for tests and dashboards.
    pub fn observed_rps(&self, service: &str) -> f64 {
        let mut windows = self.windows.lock();
        match windows.get_mut(service) {
            Some(window) => {
                window.roll_if_stale();
                window.rps()
            }
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FixedStats(Mutex<ProcessSample>);

    impl ProcessStatsSource for FixedStats {
        fn sample(&self) -> ProcessSample {
            self.0.lock().clone()
        }
    }

    fn shedder_with(sample: ProcessSample) -> Arc<LoadShedder> {
        LoadShedConfig::builder()
            .cpu_limit(0.8)
            .mem_limit(0.9)
            .thread_limit(0.9)
            .service_rps_limit(1000.0)
            .service_latency_limit(Duration::from_secs(2))
            .stats_source(Arc::new(FixedStats(Mutex::new(sample))))
            .build()
    }

    #[test]
    fn idle_process_is_admitted() {
        let shedder = shedder_with(ProcessSample::default());
        assert_eq!(shedder.check("svc"), None);
    }

    #[test]
    fn high_cpu_sheds() {
        let shedder = shedder_with(ProcessSample {
            cpu: 0.99,
            cores: 8,
            ..ProcessSample::default()
        });
        assert_eq!(shedder.check("svc"), Some(ShedReason::Cpu));
    }

    #[test]
    fn non_heap_overrides_heap_limit() {
        let shedder = shedder_with(ProcessSample {
            heap_utilization: 0.2,
            non_heap_utilization: 0.97,
            cores: 8,
            ..ProcessSample::default()
        });
        assert_eq!(shedder.check("svc"), Some(ShedReason::Memory));
    }

    #[test]
    fn thread_count_over_cores_times_ten_sheds() {
        let shedder = shedder_with(ProcessSample {
            total_threads: 90,
            cores: 8,
            ..ProcessSample::default()
        });
        assert_eq!(shedder.check("svc"), Some(ShedReason::Threads));
    }

    #[test]
    fn gc_pressure_sheds() {
        let shedder = shedder_with(ProcessSample {
            gc_time_ratio: 0.2,
            cores: 8,
            ..ProcessSample::default()
        });
        assert_eq!(shedder.check("svc"), Some(ShedReason::GcPressure));

        let shedder = shedder_with(ProcessSample {
            gc_count: 1500,
            cores: 8,
            ..ProcessSample::default()
        });
        assert_eq!(shedder.check("svc"), Some(ShedReason::GcPressure));
    }

    #[test]
    fn service_error_rate_sheds() {
        let shedder = shedder_with(ProcessSample::default());
        for _ in 0..10 {
            shedder.record_response("svc", Duration::from_millis(5), true);
        }
        assert_eq!(shedder.check("svc"), Some(ShedReason::ServiceErrorRate));
        // Other services are unaffected.
        assert_eq!(shedder.check("other"), None);
    }

    #[test]
    fn service_latency_sheds() {
        let shedder = shedder_with(ProcessSample::default());
        for _ in 0..5 {
            shedder.record_response("svc", Duration::from_secs(10), false);
        }
        assert_eq!(shedder.check("svc"), Some(ShedReason::ServiceLatency));
    }

    #[test]
    fn rps_uses_floored_window() {
        let shedder = LoadShedConfig::builder()
            .service_rps_limit(100.0)
            .build();
        for _ in 0..50 {
            shedder.record_arrival("svc");
        }
        // 50 arrivals in well under a second must not report as 50/0.01 rps;
        // the window denominator floors at one second.
        assert!(shedder.observed_rps("svc") <= 50.0);
        assert_eq!(shedder.check("svc"), None);
    }

    #[test]
    fn cpu_ewma_smooths_spikes() {
        static CALLS: AtomicU64 = AtomicU64::new(0);
        struct Spiky;
        impl ProcessStatsSource for Spiky {
            fn sample(&self) -> ProcessSample {
                let n = CALLS.fetch_add(1, Ordering::SeqCst);
                ProcessSample {
                    cpu: if n == 0 { 0.1 } else { 1.0 },
                    cores: 8,
                    ..ProcessSample::default()
                }
            }
        }
        let shedder = LoadShedConfig::builder()
            .cpu_limit(0.8)
            .stats_source(Arc::new(Spiky))
            .build();
        // First sample seeds the EWMA at 0.1, under the limit; later spikes
        // to 1.0 move it by at most alpha per sample.
        assert_eq!(shedder.check("svc"), None);
        let snap = shedder.snapshot();
        assert!(snap.cpu_ewma < 0.8);
    }
}
