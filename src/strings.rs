//! String cache: local tier first, distributed tier second.

use crate::backend::DistributedStore;
use crate::error::Result;
use crate::local::{LocalCache, LocalValue};
use crate::observability::Tier;
use crate::service::CacheService;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Name of the local-cache instance holding every string entry.
pub const STRINGS_CACHE_NAME: &str = "strings";

/// Get/set/delete of plain string values.
///
/// Obtained from [`CacheService::strings`].
pub struct StringCache<S> {
    service: CacheService<S>,
}

impl<S: DistributedStore> StringCache<S> {
    pub(crate) fn new(service: CacheService<S>) -> Self {
        StringCache { service }
    }

    fn local(&self) -> Arc<LocalCache> {
        self.service.local_cache(STRINGS_CACHE_NAME)
    }

    /// Read `key`, local tier first.
    ///
    /// A distributed hit is copied into the local tier. `Ok(None)` means both
    /// tiers miss.
    ///
    /// # Errors
    /// Distributed-tier faults (including timeouts) are returned as-is; callers
    /// on a read path treat them as "absent".
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let timer = Instant::now();
        let key = self.service.keys().string_key(key);
        let local = self.local();

        if let Some(value) = local.get_text(&key) {
            self.service
                .metrics()
                .record_hit(&key, Tier::Local, timer.elapsed());
            return Ok(Some(value));
        }
        debug!("Missed local memory cache for {}", key);

        let fetched = self
            .service
            .bounded("GET", &key, self.service.store().get(&key))
            .await;

        match fetched {
            Ok(Some(value)) => {
                local.set(key.clone(), LocalValue::Text(value.clone()));
                self.service
                    .metrics()
                    .record_hit(&key, Tier::Distributed, timer.elapsed());
                Ok(Some(value))
            }
            Ok(None) => {
                debug!("Missed distributed cache for {}", key);
                self.service.metrics().record_miss(&key, timer.elapsed());
                Ok(None)
            }
            Err(e) => {
                error!("Distributed tier error when reading string {}: {}", key, e);
                self.service.metrics().record_error(&key, &e.to_string());
                Err(e)
            }
        }
    }

    /// Like [`StringCache::get`], but on a miss calls `loader` and writes the
    /// loaded value through both tiers before returning it.
    ///
    /// Concurrent misses on one key are not coalesced; each caller may run
    /// the loader and the last write wins.
    ///
    /// # Errors
    /// Returns errors from `get`, from the loader, or from the write-through.
    pub async fn get_with_fallback<F, Fut>(&self, key: &str, loader: F) -> Result<String>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if let Some(value) = self.get(key).await? {
            return Ok(value);
        }

        let value = loader(key.to_string()).await?;
        self.write(key, &value, true).await?;
        Ok(value)
    }

    /// Store `value` in the local tier and, if `also_distributed`, in the
    /// distributed tier with the long string TTL plus jitter.
    ///
    /// # Errors
    /// Returns the distributed-tier error; the local write has already happened.
    pub async fn write(&self, key: &str, value: &str, also_distributed: bool) -> Result<()> {
        let key = self.service.keys().string_key(key);
        self.local()
            .set(key.clone(), LocalValue::Text(value.to_string()));

        if also_distributed {
            let ttl = self.service.string_ttl();
            if let Err(e) = self
                .service
                .bounded("SET", &key, self.service.store().set(&key, value, Some(ttl)))
                .await
            {
                error!("Distributed tier error when writing string {}: {}", key, e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Remove `key` from both tiers. Deleting an absent key is a no-op.
    ///
    /// # Errors
    /// Returns the distributed-tier error; the local entry is already gone.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let key = self.service.keys().string_key(key);
        self.local().delete(&key);

        self.service
            .bounded("DEL", &key, self.service.store().delete(&[key.as_str()]))
            .await
            .map(|_| ())
            .map_err(|e| {
                error!("Distributed tier error when deleting string {}: {}", key, e);
                e
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryStore;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn service() -> (CacheService<InMemoryStore>, InMemoryStore) {
        let store = InMemoryStore::new();
        (CacheService::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_write_get_delete_scenario() {
        let (cache, _) = service();
        let strings = cache.strings();

        strings
            .write("user_like_42", "10", true)
            .await
            .expect("write");
        assert_eq!(
            strings.get("user_like_42").await.expect("get"),
            Some("10".to_string())
        );

        strings.delete("user_like_42").await.expect("delete");
        assert_eq!(strings.get("user_like_42").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_unknown_key_misses_without_error() {
        let (cache, _) = service();
        assert_eq!(cache.strings().get("never").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_distributed_hit_backfills_local() {
        let (cache, store) = service();
        store.set("k", "from-store", None).await.expect("set");

        assert_eq!(
            cache.strings().get("k").await.expect("get").as_deref(),
            Some("from-store")
        );
        assert_eq!(
            cache.local_cache(STRINGS_CACHE_NAME).get_text("k").as_deref(),
            Some("from-store")
        );

        // Served locally even when the store goes away.
        store.set_unavailable(true);
        assert_eq!(
            cache.strings().get("k").await.expect("get").as_deref(),
            Some("from-store")
        );
    }

    #[tokio::test]
    async fn test_local_only_write_is_invisible_to_other_process() {
        let store = InMemoryStore::new();
        let a = CacheService::new(store.clone());
        let b = CacheService::new(store.clone());

        a.strings().write("k", "local", false).await.expect("write");
        assert_eq!(store.get("k").await.expect("get"), None);
        assert_eq!(b.strings().get("k").await.expect("get"), None);

        a.strings().write("k", "shared", true).await.expect("write");
        assert_eq!(
            b.strings().get("k").await.expect("get").as_deref(),
            Some("shared")
        );
    }

    #[tokio::test]
    async fn test_distributed_fault_propagates() {
        let (cache, store) = service();
        store.set_unavailable(true);
        let err = cache.strings().get("k").await.expect_err("fault");
        assert!(matches!(err, Error::BackendError(_)));
    }

    #[tokio::test]
    async fn test_key_prefix_applied() {
        let store = InMemoryStore::new();
        let cache = CacheService::builder(store.clone())
            .with_key_prefix("prod:")
            .build()
            .expect("build");

        cache.strings().write("k", "v", true).await.expect("write");
        assert_eq!(store.get("prod:k").await.expect("get").as_deref(), Some("v"));
        assert_eq!(store.get("k").await.expect("get"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_written_string_gets_long_ttl() {
        let store = InMemoryStore::new();
        let cache = CacheService::builder(store.clone())
            .with_string_ttl(Duration::from_secs(100), Duration::from_secs(1))
            .build()
            .expect("build");

        cache.strings().write("k", "v", true).await.expect("write");
        tokio::time::advance(Duration::from_secs(99)).await;
        assert!(store.get("k").await.expect("get").is_some());
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("k").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_get_with_fallback_loads_once_then_caches() {
        let (cache, store) = service();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .strings()
                .get_with_fallback("user_liked_3", |key| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        assert_eq!(key, "user_liked_3");
                        Ok("17".to_string())
                    }
                })
                .await
                .expect("fallback");
            assert_eq!(value, "17");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            store.get("user_liked_3").await.expect("get").as_deref(),
            Some("17")
        );
    }

    #[tokio::test]
    async fn test_get_with_fallback_loader_error() {
        let (cache, store) = service();
        let err = cache
            .strings()
            .get_with_fallback("k", |_| async {
                Err(Error::RepositoryError("no row".to_string()))
            })
            .await
            .expect_err("loader error");
        assert!(matches!(err, Error::RepositoryError(_)));
        assert_eq!(store.get("k").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_delete_twice_is_noop() {
        let (cache, _) = service();
        cache.strings().delete("missing").await.expect("delete");
        cache.strings().delete("missing").await.expect("delete");
    }
}
