//! Builder for [`CacheService`].

use crate::backend::DistributedStore;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::observability::CacheMetrics;
use crate::service::CacheService;
use std::time::Duration;

/// Fluent builder for a [`CacheService`].
///
/// Starts from [`CacheConfig::default`]; each `with_*` call overrides one field.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tiercache::{backend::InMemoryStore, CacheService};
///
/// let cache = CacheService::builder(InMemoryStore::new())
///     .with_key_prefix("staging:")
///     .with_local_ttl(Duration::from_secs(60))
///     .with_operation_timeout(Duration::from_millis(500))
///     .build()
///     .expect("valid config");
/// assert_eq!(cache.keys().prefix(), "staging:");
/// ```
pub struct CacheServiceBuilder<S> {
    store: S,
    config: CacheConfig,
    metrics: Option<Box<dyn CacheMetrics>>,
}

impl<S: DistributedStore> CacheServiceBuilder<S> {
    pub(crate) fn new(store: S) -> Self {
        Self {
            store,
            config: CacheConfig::default(),
            metrics: None,
        }
    }

    /// Replace the whole configuration, e.g. with [`CacheConfig::from_env`].
    pub fn with_config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Default lifetime of local-tier entries.
    pub fn with_local_ttl(mut self, ttl: Duration) -> Self {
        self.config.local_ttl = ttl;
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_interval = interval;
        self
    }

    /// Base TTL and jitter for strings written through to the distributed tier.
    pub fn with_string_ttl(mut self, base: Duration, jitter: Duration) -> Self {
        self.config.string_ttl = base;
        self.config.ttl_jitter = jitter;
        self
    }

    /// Bound on each distributed or database call.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Box<dyn CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the configuration and build the service.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if [`CacheConfig::validate`] fails.
    pub fn build(self) -> Result<CacheService<S>> {
        self.config.validate()?;
        Ok(CacheService::from_parts(
            self.store,
            self.config,
            self.metrics,
        ))
    }
}
