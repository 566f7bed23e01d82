//! Local (in-process) tier: short-TTL caches keyed by logical name.

use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::Instant;

/// Value held by the local tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LocalValue {
    /// Plain string from the string cache.
    Text(String),
    /// Envelope-encoded record from the entity cache.
    Record(Vec<u8>),
}

struct LocalEntry {
    value: LocalValue,
    expires_at: Instant,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// One named, in-memory cache instance with its own expiry policy.
///
/// Safe for concurrent get/set/delete. Expired entries are never returned;
/// they are removed lazily on access and by the periodic sweeper.
pub struct LocalCache {
    name: String,
    entries: DashMap<String, LocalEntry>,
    default_ttl: Duration,
    cleanup_interval: Duration,
}

impl LocalCache {
    pub fn new(name: impl Into<String>, default_ttl: Duration, cleanup_interval: Duration) -> Self {
        LocalCache {
            name: name.into(),
            entries: DashMap::new(),
            default_ttl,
            cleanup_interval,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn cleanup_interval(&self) -> Duration {
        self.cleanup_interval
    }

    pub fn get(&self, key: &str) -> Option<LocalValue> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        None
    }

    pub fn get_text(&self, key: &str) -> Option<String> {
        match self.get(key)? {
            LocalValue::Text(value) => Some(value),
            LocalValue::Record(_) => None,
        }
    }

    pub fn get_record(&self, key: &str) -> Option<Vec<u8>> {
        match self.get(key)? {
            LocalValue::Record(bytes) => Some(bytes),
            LocalValue::Text(_) => None,
        }
    }

    /// Insert with the instance's default TTL.
    pub fn set(&self, key: impl Into<String>, value: LocalValue) {
        self.set_with_ttl(key, value, self.default_ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: LocalValue, ttl: Duration) {
        self.entries.insert(
            key.into(),
            LocalEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    pub fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    /// Drop every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Process-wide mapping from logical cache name to [`LocalCache`].
///
/// Each name gets exactly one instance, created on first access even when
/// many tasks race on that access. Instances live as long as the registry.
pub struct LocalCacheRegistry {
    caches: DashMap<String, Arc<LocalCache>>,
    default_ttl: Duration,
    cleanup_interval: Duration,
    created: AtomicUsize,
}

impl LocalCacheRegistry {
    pub fn new(default_ttl: Duration, cleanup_interval: Duration) -> Self {
        LocalCacheRegistry {
            caches: DashMap::new(),
            default_ttl,
            cleanup_interval,
            created: AtomicUsize::new(0),
        }
    }

    /// Return the cache registered under `name`, constructing it if absent.
    pub fn get_or_create(&self, name: &str) -> Arc<LocalCache> {
        // Fast path: shard read lock only.
        if let Some(cache) = self.caches.get(name) {
            return Arc::clone(cache.value());
        }

        // Slow path: the entry holds the shard write lock, so the closure
        // runs at most once per name.
        let entry = self.caches.entry(name.to_string()).or_insert_with(|| {
            self.created.fetch_add(1, Ordering::SeqCst);
            let cache = Arc::new(LocalCache::new(
                name,
                self.default_ttl,
                self.cleanup_interval,
            ));
            spawn_sweeper(&cache);
            debug!("Created local cache instance {}", name);
            cache
        });
        Arc::clone(entry.value())
    }

    /// Number of instances ever constructed by this registry.
    pub fn instances_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}

/// Periodically purge `cache` while it is alive.
///
/// Needs a tokio runtime; outside one the cache relies on lazy expiry alone.
fn spawn_sweeper(cache: &Arc<LocalCache>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };

    let period = cache.cleanup_interval;
    let weak: Weak<LocalCache> = Arc::downgrade(cache);
    handle.spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let Some(cache) = weak.upgrade() else {
                break;
            };
            let removed = cache.purge_expired();
            if removed > 0 {
                debug!("Swept {} expired entries from {}", removed, cache.name);
            }
        }
    });
}
