//! Shared cache context handed to every component.

use crate::backend::DistributedStore;
use crate::builder::CacheServiceBuilder;
use crate::config::CacheConfig;
use crate::entities::EntityCache;
use crate::error::{Error, Result};
use crate::key::CacheKeyBuilder;
use crate::local::{LocalCache, LocalCacheRegistry};
use crate::observability::{CacheMetrics, TtlPolicy};
use crate::strings::StringCache;
use crate::sync::{SyncHandle, SyncJob};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

struct ServiceInner<S> {
    store: S,
    registry: LocalCacheRegistry,
    keys: CacheKeyBuilder,
    config: CacheConfig,
    string_ttl: TtlPolicy,
    metrics: Box<dyn CacheMetrics>,
}

/// Process-wide cache handle: distributed store, local registry, and config.
///
/// Construct once at startup and clone into every service that needs it.
/// Cloning is an `Arc` increment; all clones share the same local tier.
///
/// # Example
///
/// ```
/// use tiercache::{backend::InMemoryStore, CacheService};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> tiercache::Result<()> {
/// let cache = CacheService::new(InMemoryStore::new());
/// cache.strings().write("user_like_42", "10", true).await?;
///
/// let value = cache.strings().get("user_like_42").await?;
/// assert_eq!(value.as_deref(), Some("10"));
/// # Ok(())
/// # }
/// ```
pub struct CacheService<S> {
    inner: Arc<ServiceInner<S>>,
}

impl<S> Clone for CacheService<S> {
    fn clone(&self) -> Self {
        CacheService {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: DistributedStore> CacheService<S> {
    /// Service with default configuration and no metrics.
    pub fn new(store: S) -> Self {
        Self::from_parts(store, CacheConfig::default(), None)
    }

    pub fn builder(store: S) -> CacheServiceBuilder<S> {
        CacheServiceBuilder::new(store)
    }

    pub(crate) fn from_parts(
        store: S,
        config: CacheConfig,
        metrics: Option<Box<dyn CacheMetrics>>,
    ) -> Self {
        let registry = LocalCacheRegistry::new(config.local_ttl, config.cleanup_interval);
        let keys = CacheKeyBuilder::new(config.key_prefix.clone());
        let string_ttl = TtlPolicy::Jittered {
            base: config.string_ttl,
            jitter: config.ttl_jitter,
        };
        CacheService {
            inner: Arc::new(ServiceInner {
                store,
                registry,
                keys,
                config,
                string_ttl,
                metrics: metrics.unwrap_or_else(|| Box::new(crate::observability::NoOpMetrics)),
            }),
        }
    }

    pub fn strings(&self) -> StringCache<S> {
        StringCache::new(self.clone())
    }

    pub fn entities(&self) -> EntityCache<S> {
        EntityCache::new(self.clone())
    }

    /// Direct access to the distributed tier, including its transaction primitive.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn registry(&self) -> &LocalCacheRegistry {
        &self.inner.registry
    }

    pub fn keys(&self) -> &CacheKeyBuilder {
        &self.inner.keys
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Local cache instance for `name`, created on first use.
    pub fn local_cache(&self, name: &str) -> Arc<LocalCache> {
        self.inner.registry.get_or_create(name)
    }

    /// Spawn the periodic sync daemon against this service's store.
    ///
    /// See [`crate::sync::start_periodic_sync`].
    ///
    /// # Errors
    /// Returns `Error::ConfigError` for a zero interval.
    pub fn start_periodic_sync<J>(&self, interval: Duration, job: J) -> Result<SyncHandle>
    where
        J: SyncJob<S>,
    {
        crate::sync::start_periodic_sync(interval, self.inner.store.clone(), job)
    }

    pub(crate) fn metrics(&self) -> &dyn CacheMetrics {
        self.inner.metrics.as_ref()
    }

    pub(crate) fn string_ttl(&self) -> Duration {
        self.inner.string_ttl.get_ttl()
    }

    /// Run a distributed or database call under the configured timeout.
    pub(crate) async fn bounded<T, F>(&self, op: &str, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.inner.config.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "{} {} exceeded {:?}",
                    op, key, self.inner.config.operation_timeout
                );
                Err(Error::Timeout(format!("{} {}", op, key)))
            }
        }
    }
}
