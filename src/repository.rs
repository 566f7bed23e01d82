//! System-of-record access for the entity cache.

use crate::entity::CacheableEntity;
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Primary-key lookup against the database.
///
/// `Ok(None)` means zero rows matched, which the cache treats as
/// authoritative absence.
///
/// # Example
///
/// ```ignore
/// struct VideoRepository {
///     pool: PgPool,
/// }
///
/// impl DataRepository<Video> for VideoRepository {
///     async fn fetch_by_id(&self, id: u32) -> tiercache::Result<Option<Video>> {
///         sqlx::query_as("SELECT * FROM videos WHERE id = $1")
///             .bind(id as i64)
///             .fetch_optional(&self.pool)
///             .await
///             .map_err(|e| tiercache::Error::RepositoryError(e.to_string()))
///     }
/// }
/// ```
pub trait DataRepository<T: CacheableEntity>: Send + Sync {
    fn fetch_by_id(&self, id: u32) -> impl Future<Output = Result<Option<T>>> + Send;
}

/// Map-backed repository for tests and demos.
///
/// Clones share rows and the fetch counter.
#[derive(Clone)]
pub struct InMemoryRepository<T> {
    rows: Arc<DashMap<u32, T>>,
    fetches: Arc<AtomicUsize>,
    unavailable: Arc<AtomicBool>,
}

impl<T> Default for InMemoryRepository<T> {
    fn default() -> Self {
        InMemoryRepository {
            rows: Arc::new(DashMap::new()),
            fetches: Arc::new(AtomicUsize::new(0)),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<T: CacheableEntity> InMemoryRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the row for `entity.id()`.
    pub fn insert(&self, entity: T) {
        self.rows.insert(entity.id(), entity);
    }

    pub fn remove(&self, id: u32) -> Option<T> {
        self.rows.remove(&id).map(|(_, row)| row)
    }

    /// Number of `fetch_by_id` calls made so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// While set, every fetch fails with `Error::RepositoryError`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl<T: CacheableEntity> DataRepository<T> for InMemoryRepository<T> {
    async fn fetch_by_id(&self, id: u32) -> Result<Option<T>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(Error::RepositoryError(format!(
                "database unavailable while fetching id {}",
                id
            )));
        }
        Ok(self.rows.get(&id).map(|row| row.value().clone()))
    }
}
