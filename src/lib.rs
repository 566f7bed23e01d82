//! # tiercache
//!
//! A tiered read-through cache for services that share one distributed store.
//!
//! Reads consult, in order:
//!
//! 1. a process-local in-memory tier (short TTL, per-name instances),
//! 2. a distributed key-value tier shared by every process (Redis in production),
//! 3. the database, through a caller-supplied [`DataRepository`].
//!
//! Each hit is copied into the faster tiers above it.
//!
//! ## Features
//!
//! - **String cache:** get/write/delete of plain strings with a long, jittered distributed TTL
//! - **Entity cache:** whole records addressed by namespace and numeric ID, with explicit invalidation
//! - **Named local caches:** created once per name, even under concurrent first use
//! - **Counters:** atomic like/unlike bookkeeping via distributed transactions
//! - **Sync daemon:** periodic background job against the distributed tier, cancellable
//!
//! ## Quick Start
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use tiercache::{
//!     backend::InMemoryStore, repository::InMemoryRepository, CacheService, CacheableEntity,
//! };
//!
//! #[derive(Clone, Default, Serialize, Deserialize)]
//! struct Video {
//!     id: u32,
//!     title: String,
//! }
//!
//! impl CacheableEntity for Video {
//!     fn id(&self) -> u32 {
//!         self.id
//!     }
//!
//!     fn is_populated(&self) -> bool {
//!         !self.title.is_empty()
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tiercache::Result<()> {
//! let cache = CacheService::new(InMemoryStore::new());
//! let videos = InMemoryRepository::new();
//! videos.insert(Video { id: 7, title: "cats".into() });
//!
//! let mut video = Video { id: 7, ..Default::default() };
//! assert!(cache.entities().read("video_", &mut video, &videos).await?);
//! assert_eq!(video.title, "cats");
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod builder;
pub mod config;
pub mod counter;
pub mod entities;
pub mod entity;
pub mod error;
pub mod key;
pub mod local;
pub mod observability;
pub mod repository;
pub mod serialization;
pub mod service;
pub mod strings;
pub mod sync;

// Re-exports for convenience
pub use backend::DistributedStore;
pub use builder::CacheServiceBuilder;
pub use config::{CacheConfig, RedisConfig};
pub use counter::{LikeLedger, LikeOutcome};
pub use entities::EntityCache;
pub use entity::CacheableEntity;
pub use error::{Error, Result};
pub use repository::DataRepository;
pub use service::CacheService;
pub use strings::StringCache;
pub use sync::SyncHandle;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
