//! The recognized configuration surface.
//!
//! Every section deserializes from camelCase keys, so a JSON or YAML config
//! file maps one-to-one onto the documented key set
//! (`circuit.failureRateThreshold`, `rateLimit.rps`, …). All durations are
//! integer milliseconds unless the key says otherwise.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CrossbarConfig {
    /// Base per-attempt timeout when no adaptive history exists.
    pub default_timeout_ms: u64,
    /// Transport connection pool ceiling; handed to transport builders.
    pub max_connections: usize,
    pub circuit: CircuitSection,
    pub bulkhead: BulkheadSection,
    pub rate_limit: RateLimitSection,
    pub timeout: TimeoutSection,
    pub retry: RetrySection,
    pub load_shed: LoadShedSection,
    pub oauth: OAuthSection,
    pub cache: CacheSection,
    pub ws: WsSection,
    pub upload: UploadSection,
}

impl Default for CrossbarConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 5_000,
            max_connections: 32,
            circuit: CircuitSection::default(),
            bulkhead: BulkheadSection::default(),
            rate_limit: RateLimitSection::default(),
            timeout: TimeoutSection::default(),
            retry: RetrySection::default(),
            load_shed: LoadShedSection::default(),
            oauth: OAuthSection::default(),
            cache: CacheSection::default(),
            ws: WsSection::default(),
            upload: UploadSection::default(),
        }
    }
}

impl CrossbarConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitSection {
    /// Percentage, 0–100.
    pub failure_rate_threshold: f64,
    pub minimum_number_of_calls: usize,
    pub sliding_window_size: usize,
    pub wait_duration_in_open_ms: u64,
    pub permitted_probes: usize,
    pub slow_call_threshold_ms: Option<u64>,
}

impl Default for CircuitSection {
    fn default() -> Self {
        Self {
            failure_rate_threshold: 50.0,
            minimum_number_of_calls: 10,
            sliding_window_size: 20,
            wait_duration_in_open_ms: 30_000,
            permitted_probes: 3,
            slow_call_threshold_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BulkheadSection {
    pub max_concurrent: usize,
    pub max_wait_ms: u64,
}

impl Default for BulkheadSection {
    fn default() -> Self {
        Self {
            max_concurrent: 25,
            max_wait_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitSection {
    pub rps: f64,
    pub burst: usize,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            rps: 100.0,
            burst: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutSection {
    /// Adaptive lower bound; 0 falls back to `defaultTimeoutMs`.
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            base_ms: 0,
            max_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Fraction in `[0, 1)`.
    pub jitter: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 30_000,
            jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadShedSection {
    pub cpu: f64,
    pub mem: f64,
    pub threads: f64,
    pub rps: f64,
    pub latency_ms: u64,
}

impl Default for LoadShedSection {
    fn default() -> Self {
        Self {
            cpu: 0.9,
            mem: 0.9,
            threads: 0.9,
            rps: f64::INFINITY,
            latency_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OAuthSection {
    pub refresh_buffer_secs: u64,
}

impl Default for OAuthSection {
    fn default() -> Self {
        Self {
            refresh_buffer_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSection {
    pub max_entries: usize,
    pub default_ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: 1_000,
            default_ttl_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WsSection {
    pub heartbeat_ms: u64,
    pub reconnect_base_backoff_ms: u64,
    pub queue_max: usize,
}

impl Default for WsSection {
    fn default() -> Self {
        Self {
            heartbeat_ms: 30_000,
            reconnect_base_backoff_ms: 500,
            queue_max: 1_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadSection {
    pub chunk_size: usize,
    pub max_parallel: usize,
}

impl Default for UploadSection {
    fn default() -> Self {
        Self {
            chunk_size: 5 * 1024 * 1024,
            max_parallel: 4,
        }
    }
}

impl CrossbarConfig {
    pub fn attempt_base_timeout(&self) -> Duration {
        let base = if self.timeout.base_ms == 0 {
            self.default_timeout_ms
        } else {
            self.timeout.base_ms
        };
        Duration::from_millis(base.max(1))
    }

    pub fn attempt_max_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout.max_ms.max(self.timeout.base_ms))
    }
}
