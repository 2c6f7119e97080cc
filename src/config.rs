use std::sync::Arc;
use std::time::Duration;

use crate::compressor::{Compressor, NoopCompressor};
use crate::hasher::{Hasher, ModuloHasher};

/// Client configuration. Construct with [`Config::default`] and override
/// fields with the builder setters; the defaults match the original
/// implementation's `DefaultConfig()`.
#[derive(Clone)]
pub struct Config {
    pub(crate) hasher: Arc<dyn Hasher>,
    pub(crate) compressor: Arc<dyn Compressor>,
    pub(crate) retries: usize,
    pub(crate) retry_delay: Duration,
    pub(crate) failover: bool,
    pub(crate) connection_timeout: Duration,
    pub(crate) down_retry_delay: Duration,
    pub(crate) pool_size: usize,
    pub(crate) tcp_keepalive: bool,
    pub(crate) tcp_keepalive_period: Duration,
    pub(crate) tcp_nodelay: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hasher: Arc::new(ModuloHasher),
            compressor: Arc::new(NoopCompressor),
            retries: 2,
            retry_delay: Duration::from_millis(200),
            failover: true,
            connection_timeout: Duration::from_secs(2),
            down_retry_delay: Duration::from_secs(60),
            pool_size: 1,
            tcp_keepalive: true,
            tcp_keepalive_period: Duration::from_secs(60),
            tcp_nodelay: true,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("failover", &self.failover)
            .field("connection_timeout", &self.connection_timeout)
            .field("down_retry_delay", &self.down_retry_delay)
            .field("pool_size", &self.pool_size)
            .field("tcp_keepalive", &self.tcp_keepalive)
            .field("tcp_keepalive_period", &self.tcp_keepalive_period)
            .field("tcp_nodelay", &self.tcp_nodelay)
            .finish()
    }
}

impl Config {
    pub fn with_hasher<H: Hasher + 'static>(mut self, hasher: H) -> Self {
        self.hasher = Arc::new(hasher);
        self
    }

    pub fn with_compressor<C: Compressor + 'static>(mut self, compressor: C) -> Self {
        self.compressor = Arc::new(compressor);
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_failover(mut self, failover: bool) -> Self {
        self.failover = failover;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_down_retry_delay(mut self, delay: Duration) -> Self {
        self.down_retry_delay = delay;
        self
    }

    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size.max(1);
        self
    }

    pub fn with_tcp_keepalive(mut self, enabled: bool, period: Duration) -> Self {
        self.tcp_keepalive = enabled;
        self.tcp_keepalive_period = period;
        self
    }

    pub fn with_tcp_nodelay(mut self, enabled: bool) -> Self {
        self.tcp_nodelay = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_original_client() {
        let config = Config::default();
        assert_eq!(2, config.retries);
        assert_eq!(Duration::from_millis(200), config.retry_delay);
        assert!(config.failover);
        assert_eq!(Duration::from_secs(2), config.connection_timeout);
        assert_eq!(Duration::from_secs(60), config.down_retry_delay);
        assert_eq!(1, config.pool_size);
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::default().with_retries(5).with_pool_size(8);
        assert_eq!(5, config.retries);
        assert_eq!(8, config.pool_size);
    }
}
