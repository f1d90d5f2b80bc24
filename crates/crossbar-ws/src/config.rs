use std::time::Duration;

/// Tuning for a supervised session.
pub struct WsSupervisorConfig {
    pub(crate) heartbeat_interval: Duration,
    pub(crate) reconnect_base_backoff: Duration,
    pub(crate) reconnect_max_backoff: Duration,
    pub(crate) queue_max: usize,
    pub(crate) queueing_enabled: bool,
    pub(crate) ack_timeout: Duration,
}

impl WsSupervisorConfig {
    pub fn builder() -> WsSupervisorConfigBuilder {
        WsSupervisorConfigBuilder::new()
    }
}

/// Builder for [`WsSupervisorConfig`].
pub struct WsSupervisorConfigBuilder {
    heartbeat_interval: Duration,
    reconnect_base_backoff: Duration,
    reconnect_max_backoff: Duration,
    queue_max: usize,
    queueing_enabled: bool,
    ack_timeout: Duration,
}

impl WsSupervisorConfigBuilder {
    pub fn new() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            reconnect_base_backoff: Duration::from_millis(500),
            reconnect_max_backoff: Duration::from_secs(30),
            queue_max: 1000,
            queueing_enabled: true,
            ack_timeout: Duration::from_secs(10),
        }
    }

    /// Outbound heartbeat cadence; the session reconnects when no inbound
    /// heartbeat is observed for twice this interval.
    ///
    /// Default: 30 seconds
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Exponential reconnect backoff band: `base × 2^attempt`, capped at
    /// `max`.
    ///
    /// Default: 500 ms to 30 s
    pub fn reconnect_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.reconnect_base_backoff = base;
        self.reconnect_max_backoff = max.max(base);
        self
    }

    /// Bound on messages parked while the session is not open.
    ///
    /// Default: 1000
    pub fn queue_max(mut self, max: usize) -> Self {
        self.queue_max = max;
        self
    }

    /// Disables queueing entirely; sends while not open fail fast.
    ///
    /// Default: enabled
    pub fn queueing_enabled(mut self, enabled: bool) -> Self {
        self.queueing_enabled = enabled;
        self
    }

    /// How long an acknowledged send waits before failing.
    ///
    /// Default: 10 seconds
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn build(self) -> WsSupervisorConfig {
        WsSupervisorConfig {
            heartbeat_interval: self.heartbeat_interval,
            reconnect_base_backoff: self.reconnect_base_backoff,
            reconnect_max_backoff: self.reconnect_max_backoff,
            queue_max: self.queue_max,
            queueing_enabled: self.queueing_enabled,
            ack_timeout: self.ack_timeout,
        }
    }
}

impl Default for WsSupervisorConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
