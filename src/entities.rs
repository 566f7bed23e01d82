//! Structured entity cache: local tier → distributed tier → database.
//!
//! Records are addressed by `<prefix><namespace><id>`. Each namespace has its
//! own local-cache instance; in the distributed tier a record is a flat field
//! map. The local tier is a read-through snapshot: business logic mutates the
//! database or the distributed tier, then calls [`EntityCache::invalidate`].

use crate::backend::DistributedStore;
use crate::entity::CacheableEntity;
use crate::error::{Error, Result};
use crate::local::{LocalCache, LocalValue};
use crate::observability::Tier;
use crate::repository::DataRepository;
use crate::serialization::{deserialize_from_cache, serialize_for_cache};
use crate::service::CacheService;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of consulting the two cache tiers.
enum CacheLookup {
    Hit(Tier),
    Miss,
    /// The distributed tier did not answer in time.
    TimedOut(Error),
}

/// Read/write/invalidate of whole records by numeric ID.
///
/// Obtained from [`CacheService::entities`].
pub struct EntityCache<S> {
    service: CacheService<S>,
}

impl<S: DistributedStore> EntityCache<S> {
    pub(crate) fn new(service: CacheService<S>) -> Self {
        EntityCache { service }
    }

    fn locate<T: CacheableEntity>(&self, namespace: &str, entity: &T) -> (Arc<LocalCache>, String) {
        let keys = self.service.keys();
        let local = self.service.local_cache(&keys.namespace_key(namespace));
        (local, keys.composite_key(namespace, entity.id()))
    }

    /// Fill `entity` (whose ID is set) from the fastest tier holding it.
    ///
    /// Returns `Ok(true)` when found. A distributed hit is copied into the
    /// local tier; a database hit is copied into both cache tiers. Zero
    /// database rows yields `Ok(false)`.
    ///
    /// # Errors
    /// - Distributed-tier faults other than timeouts (timeouts fall through to
    ///   the database)
    /// - `Error::RepositoryError` / `Error::Timeout` from the database
    /// - `Error::ValidationError` if the database row fails validation
    pub async fn read<T, R>(&self, namespace: &str, entity: &mut T, repository: &R) -> Result<bool>
    where
        T: CacheableEntity,
        R: DataRepository<T>,
    {
        let timer = Instant::now();
        let (local, key) = self.locate(namespace, entity);

        match self.lookup(&local, &key, entity).await {
            Ok(CacheLookup::Hit(tier)) => {
                self.service.metrics().record_hit(&key, tier, timer.elapsed());
                return Ok(true);
            }
            Ok(CacheLookup::Miss) => {}
            Ok(CacheLookup::TimedOut(e)) => {
                warn!("Falling back to database for {} after {}", key, e);
            }
            Err(e) => {
                self.service.metrics().record_error(&key, &e.to_string());
                return Err(e);
            }
        }

        let id = entity.id();
        let row = match self
            .service
            .bounded("FETCH", &key, repository.fetch_by_id(id))
            .await
        {
            Ok(row) => row,
            Err(e) => {
                error!("Database error when reading {}: {}", key, e);
                self.service.metrics().record_error(&key, &e.to_string());
                return Err(e);
            }
        };

        let Some(row) = row else {
            warn!("Missed database for {}, seems wrong key", key);
            self.service.metrics().record_miss(&key, timer.elapsed());
            return Ok(false);
        };

        if row.id() != id {
            return Err(Error::ValidationError(format!(
                "repository returned id {} for {}",
                row.id(),
                key
            )));
        }
        row.validate()?;
        *entity = row;

        let fields = entity.to_fields()?;
        if let Err(e) = self
            .service
            .bounded("HSET", &key, self.service.store().hset_all(&key, &fields))
            .await
        {
            error!("Distributed tier error when backfilling {}: {}", key, e);
        }
        local.set(key.clone(), LocalValue::Record(serialize_for_cache(&*entity)?));

        self.service
            .metrics()
            .record_hit(&key, Tier::Database, timer.elapsed());
        Ok(true)
    }

    /// Like [`EntityCache::read`] but never touches the database.
    ///
    /// `Ok(false)` means "not cached", not "does not exist".
    ///
    /// # Errors
    /// Any distributed-tier fault, including timeouts.
    pub async fn read_cache_only<T>(&self, namespace: &str, entity: &mut T) -> Result<bool>
    where
        T: CacheableEntity,
    {
        let timer = Instant::now();
        let (local, key) = self.locate(namespace, entity);

        match self.lookup(&local, &key, entity).await {
            Ok(CacheLookup::Hit(tier)) => {
                self.service.metrics().record_hit(&key, tier, timer.elapsed());
                Ok(true)
            }
            Ok(CacheLookup::Miss) => {
                self.service.metrics().record_miss(&key, timer.elapsed());
                Ok(false)
            }
            Ok(CacheLookup::TimedOut(e)) | Err(e) => {
                self.service.metrics().record_error(&key, &e.to_string());
                Err(e)
            }
        }
    }

    /// Store `entity` in the local tier.
    ///
    /// With `refresh_from_distributed`, the distributed copy is then read back
    /// over `entity` and the reconciled record replaces the local copy. An
    /// absent distributed record leaves both untouched.
    ///
    /// # Errors
    /// Serialization errors, or distributed-tier faults during the refresh.
    pub async fn write_local<T>(
        &self,
        namespace: &str,
        entity: &mut T,
        refresh_from_distributed: bool,
    ) -> Result<()>
    where
        T: CacheableEntity,
    {
        let (local, key) = self.locate(namespace, entity);
        local.set(key.clone(), LocalValue::Record(serialize_for_cache(&*entity)?));

        if refresh_from_distributed {
            let fields = self
                .service
                .bounded("HGETALL", &key, self.service.store().hget_all(&key))
                .await
                .map_err(|e| {
                    error!("Distributed tier error when refreshing {}: {}", key, e);
                    e
                })?;
            if !fields.is_empty() {
                entity.apply_fields(&fields)?;
                local.set(key, LocalValue::Record(serialize_for_cache(&*entity)?));
            }
        }
        Ok(())
    }

    /// Drop the record from the distributed and local tiers.
    ///
    /// The next [`EntityCache::read`] goes through the full fallback chain.
    /// Invalidating an absent key is a no-op.
    ///
    /// # Errors
    /// Returns the distributed-tier error; the local entry is removed regardless.
    pub async fn invalidate<T>(&self, namespace: &str, entity: &T) -> Result<()>
    where
        T: CacheableEntity,
    {
        let (local, key) = self.locate(namespace, entity);

        let removed = self
            .service
            .bounded("DEL", &key, self.service.store().delete(&[key.as_str()]))
            .await;
        local.delete(&key);

        match removed {
            Ok(_) => {
                debug!("Invalidated {}", key);
                Ok(())
            }
            Err(e) => {
                error!("Distributed tier error when invalidating {}: {}", key, e);
                Err(e)
            }
        }
    }

    /// Local tier, then distributed tier. Fills `entity` on a hit.
    async fn lookup<T: CacheableEntity>(
        &self,
        local: &LocalCache,
        key: &str,
        entity: &mut T,
    ) -> Result<CacheLookup> {
        if let Some(bytes) = local.get_record(key) {
            match deserialize_from_cache::<T>(&bytes) {
                Ok(cached) => {
                    *entity = cached;
                    return Ok(CacheLookup::Hit(Tier::Local));
                }
                Err(e) => {
                    warn!("Discarding unreadable local entry {}: {}", key, e);
                    local.delete(key);
                }
            }
        }
        debug!("Missed local memory cache for {}", key);

        let fields = match self
            .service
            .bounded("HGETALL", key, self.service.store().hget_all(key))
            .await
        {
            Ok(fields) => fields,
            Err(e) if e.is_timeout() => return Ok(CacheLookup::TimedOut(e)),
            Err(e) => {
                error!("Distributed tier error when reading {}: {}", key, e);
                return Err(e);
            }
        };

        if fields.is_empty() {
            debug!("Missed distributed cache for {}", key);
            return Ok(CacheLookup::Miss);
        }

        let mut candidate = entity.clone();
        candidate.apply_fields(&fields)?;
        if !candidate.is_populated() {
            debug!("Distributed entry {} holds no data", key);
            return Ok(CacheLookup::Miss);
        }

        *entity = candidate;
        local.set(key.to_string(), LocalValue::Record(serialize_for_cache(&*entity)?));
        debug!("Distributed cache hit for {}", key);
        Ok(CacheLookup::Hit(Tier::Distributed))
    }
}
