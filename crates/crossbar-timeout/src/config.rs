use crate::AdaptiveTimeout;
use std::sync::Arc;
use std::time::Duration;

/// Configuration entry point for [`AdaptiveTimeout`].
pub struct AdaptiveTimeoutConfig;

impl AdaptiveTimeoutConfig {
    pub fn builder() -> AdaptiveTimeoutConfigBuilder {
        AdaptiveTimeoutConfigBuilder::new()
    }
}

/// Builder for [`AdaptiveTimeout`].
pub struct AdaptiveTimeoutConfigBuilder {
    base_timeout: Duration,
    max_timeout: Duration,
    name: String,
}

impl AdaptiveTimeoutConfigBuilder {
    pub fn new() -> Self {
        Self {
            base_timeout: Duration::from_secs(5),
            max_timeout: Duration::from_secs(30),
            name: String::from("<unnamed>"),
        }
    }

    /// Lower bound, and the value used until enough samples accumulate.
    ///
    /// Default: 5 seconds
    pub fn base_timeout(mut self, base: Duration) -> Self {
        self.base_timeout = base;
        self
    }

    /// Upper bound the adaptive value can never exceed.
    ///
    /// Default: 30 seconds
    pub fn max_timeout(mut self, max: Duration) -> Self {
        self.max_timeout = max;
        self
    }

    pub fn name<N: Into<String>>(mut self, name: N) -> Self {
        self.name = name.into();
        self
    }

    pub fn build(self) -> Arc<AdaptiveTimeout> {
        AdaptiveTimeout::new(self.base_timeout, self.max_timeout, self.name)
    }
}

impl Default for AdaptiveTimeoutConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
