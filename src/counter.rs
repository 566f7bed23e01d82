//! Like/unlike counters kept in the distributed tier.
//!
//! Each like touches three keys at once:
//!
//! | Key | Type | Meaning |
//! |---|---|---|
//! | `<prefix>video_like_<video>` | integer | likes on the video |
//! | `<prefix>user_liked_<author>` | integer | likes the author has received |
//! | `<prefix>user_like_<actor>` | ordered set | videos the actor liked, scored by unix time |
//!
//! The three writes go out as one atomic transaction guarded on the actor's
//! ordered-set membership, so they all apply or none do. A plain `ZSCORE`
//! runs first to skip the transaction for the common duplicate; the guard
//! catches a concurrent like or unlike that lands after that read.

use crate::backend::{DistributedStore, Transaction};
use crate::error::{Error, Result};
use crate::service::CacheService;
use std::time::{SystemTime, UNIX_EPOCH};

pub const VIDEO_LIKE_NAMESPACE: &str = "video_like_";
pub const USER_LIKED_NAMESPACE: &str = "user_liked_";
pub const USER_LIKE_NAMESPACE: &str = "user_like_";

/// Result of a like or unlike request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Counters and membership were updated.
    Applied,
    /// Already liked (for `like`) or not liked (for `unlike`); nothing changed.
    Duplicate,
}

/// Like ledger over a [`CacheService`]'s distributed tier.
pub struct LikeLedger<S> {
    service: CacheService<S>,
}

impl<S: DistributedStore> LikeLedger<S> {
    pub fn new(service: CacheService<S>) -> Self {
        LikeLedger { service }
    }

    fn key(&self, namespace: &str, id: u32) -> String {
        self.service.keys().composite_key(namespace, id)
    }

    /// Record that `actor` liked `video`, which was uploaded by `author`.
    ///
    /// # Errors
    /// Distributed-tier faults, or `Error::TransactionAborted` if the
    /// transaction was discarded (no counter changed).
    pub async fn like(&self, actor: u32, video: u32, author: u32) -> Result<LikeOutcome> {
        if self.is_liked(actor, video).await? {
            info!("User {} duplicate like on video {}", actor, video);
            return Ok(LikeOutcome::Duplicate);
        }

        let likes_key = self.key(USER_LIKE_NAMESPACE, actor);
        let tx = Transaction::new()
            .require_absent(likes_key.clone(), video.to_string())
            .incr_by(self.key(VIDEO_LIKE_NAMESPACE, video), 1)
            .incr_by(self.key(USER_LIKED_NAMESPACE, author), 1)
            .zadd(likes_key.clone(), video.to_string(), unix_now());

        let outcome = self.commit(tx, &likes_key).await?;
        match outcome {
            LikeOutcome::Applied => debug!("User {} liked video {}", actor, video),
            LikeOutcome::Duplicate => info!("User {} duplicate like on video {}", actor, video),
        }
        Ok(outcome)
    }

    /// Undo a like previously recorded with [`LikeLedger::like`].
    ///
    /// # Errors
    /// Same as [`LikeLedger::like`].
    pub async fn unlike(&self, actor: u32, video: u32, author: u32) -> Result<LikeOutcome> {
        if !self.is_liked(actor, video).await? {
            info!("User {} did not like video {}, nothing to cancel", actor, video);
            return Ok(LikeOutcome::Duplicate);
        }

        let likes_key = self.key(USER_LIKE_NAMESPACE, actor);
        let tx = Transaction::new()
            .require_present(likes_key.clone(), video.to_string())
            .incr_by(self.key(VIDEO_LIKE_NAMESPACE, video), -1)
            .incr_by(self.key(USER_LIKED_NAMESPACE, author), -1)
            .zrem(likes_key.clone(), video.to_string());

        let outcome = self.commit(tx, &likes_key).await?;
        match outcome {
            LikeOutcome::Applied => debug!("User {} unliked video {}", actor, video),
            LikeOutcome::Duplicate => {
                info!("User {} did not like video {}, nothing to cancel", actor, video)
            }
        }
        Ok(outcome)
    }

    /// Run a guarded transaction; a guard that no longer holds is a duplicate.
    async fn commit(&self, tx: Transaction, likes_key: &str) -> Result<LikeOutcome> {
        let result = self
            .service
            .bounded("EXEC", likes_key, self.service.store().exec_atomic(tx))
            .await;
        match result {
            Ok(_) => Ok(LikeOutcome::Applied),
            Err(Error::PreconditionFailed(_)) => Ok(LikeOutcome::Duplicate),
            Err(e) => {
                error!("Like transaction failed for {}: {}", likes_key, e);
                Err(e)
            }
        }
    }

    pub async fn is_liked(&self, actor: u32, video: u32) -> Result<bool> {
        let key = self.key(USER_LIKE_NAMESPACE, actor);
        let score = self
            .service
            .bounded(
                "ZSCORE",
                &key,
                self.service.store().zscore(&key, &video.to_string()),
            )
            .await?;
        Ok(score.is_some())
    }

    /// Likes on `video`; an absent counter counts as zero.
    pub async fn video_like_count(&self, video: u32) -> Result<i64> {
        self.read_counter(VIDEO_LIKE_NAMESPACE, video).await
    }

    /// Likes received by everything `author` uploaded.
    pub async fn user_liked_count(&self, author: u32) -> Result<i64> {
        self.read_counter(USER_LIKED_NAMESPACE, author).await
    }

    /// Number of videos `actor` currently likes.
    pub async fn user_like_count(&self, actor: u32) -> Result<u64> {
        let key = self.key(USER_LIKE_NAMESPACE, actor);
        self.service
            .bounded("ZCARD", &key, self.service.store().zcard(&key))
            .await
    }

    /// Videos `actor` likes, most recent first.
    ///
    /// Members that are not valid IDs are skipped with a warning.
    pub async fn liked_videos(&self, actor: u32) -> Result<Vec<u32>> {
        let key = self.key(USER_LIKE_NAMESPACE, actor);
        let members = self
            .service
            .bounded("ZREVRANGE", &key, self.service.store().zrevrange(&key, 0, -1))
            .await?;

        Ok(members
            .into_iter()
            .filter_map(|member| match member.parse::<u32>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Ignoring malformed member {:?} in {}", member, key);
                    None
                }
            })
            .collect())
    }

    async fn read_counter(&self, namespace: &str, id: u32) -> Result<i64> {
        let key = self.key(namespace, id);
        let raw = self
            .service
            .bounded("GET", &key, self.service.store().get(&key))
            .await?;
        match raw {
            None => Ok(0),
            Some(raw) => raw.parse::<i64>().map_err(|e| {
                Error::DeserializationError(format!(
                    "counter {} holds {:?}: {}",
                    key, raw, e
                ))
            }),
        }
    }
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as f64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryStore;
    use futures::future::join_all;
    use std::time::Duration;

    fn ledger() -> (LikeLedger<InMemoryStore>, InMemoryStore) {
        let store = InMemoryStore::new();
        (LikeLedger::new(CacheService::new(store.clone())), store)
    }

    #[tokio::test]
    async fn test_like_updates_all_counters() {
        let (ledger, _) = ledger();
        assert_eq!(ledger.like(42, 7, 3).await.expect("like"), LikeOutcome::Applied);

        assert!(ledger.is_liked(42, 7).await.expect("is_liked"));
        assert_eq!(ledger.video_like_count(7).await.expect("count"), 1);
        assert_eq!(ledger.user_liked_count(3).await.expect("count"), 1);
        assert_eq!(ledger.user_like_count(42).await.expect("count"), 1);
        assert_eq!(ledger.liked_videos(42).await.expect("list"), vec![7]);
    }

    #[tokio::test]
    async fn test_duplicate_like_is_rejected() {
        let (ledger, _) = ledger();
        ledger.like(42, 7, 3).await.expect("like");
        assert_eq!(
            ledger.like(42, 7, 3).await.expect("like"),
            LikeOutcome::Duplicate
        );
        assert_eq!(ledger.video_like_count(7).await.expect("count"), 1);
    }

    #[tokio::test]
    async fn test_unlike_reverses_like() {
        let (ledger, _) = ledger();
        ledger.like(42, 7, 3).await.expect("like");
        assert_eq!(
            ledger.unlike(42, 7, 3).await.expect("unlike"),
            LikeOutcome::Applied
        );

        assert!(!ledger.is_liked(42, 7).await.expect("is_liked"));
        assert_eq!(ledger.video_like_count(7).await.expect("count"), 0);
        assert_eq!(ledger.user_liked_count(3).await.expect("count"), 0);
        assert!(ledger.liked_videos(42).await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn test_unlike_without_like_is_duplicate() {
        let (ledger, _) = ledger();
        assert_eq!(
            ledger.unlike(42, 7, 3).await.expect("unlike"),
            LikeOutcome::Duplicate
        );
        assert_eq!(ledger.video_like_count(7).await.expect("count"), 0);
    }

    #[tokio::test]
    async fn test_aborted_transaction_changes_nothing() {
        let (ledger, store) = ledger();
        store.fail_next_transaction();

        let err = ledger.like(42, 7, 3).await.expect_err("aborted");
        assert!(matches!(err, Error::TransactionAborted(_)));
        assert!(!ledger.is_liked(42, 7).await.expect("is_liked"));
        assert_eq!(ledger.video_like_count(7).await.expect("count"), 0);
        assert_eq!(ledger.user_liked_count(3).await.expect("count"), 0);
        assert_eq!(ledger.user_like_count(42).await.expect("count"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_likes_apply_once() {
        let (ledger, store) = ledger();
        // Every request reads the ordered set before any of them commits.
        store.set_latency(Some(Duration::from_millis(5)));

        let outcomes = join_all((0..8).map(|_| ledger.like(42, 7, 3))).await;
        let applied = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(LikeOutcome::Applied)))
            .count();
        assert_eq!(applied, 1);
        assert!(outcomes.iter().all(|o| o.is_ok()));

        assert_eq!(ledger.video_like_count(7).await.expect("count"), 1);
        assert_eq!(ledger.user_liked_count(3).await.expect("count"), 1);
        assert_eq!(ledger.user_like_count(42).await.expect("count"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_unlikes_apply_once() {
        let (ledger, store) = ledger();
        ledger.like(42, 7, 3).await.expect("like");
        store.set_latency(Some(Duration::from_millis(5)));

        let outcomes = join_all((0..4).map(|_| ledger.unlike(42, 7, 3))).await;
        let applied = outcomes
            .iter()
            .filter(|o| matches!(o, Ok(LikeOutcome::Applied)))
            .count();
        assert_eq!(applied, 1);

        assert_eq!(ledger.video_like_count(7).await.expect("count"), 0);
        assert_eq!(ledger.user_liked_count(3).await.expect("count"), 0);
        assert!(!ledger.is_liked(42, 7).await.expect("is_liked"));
    }

    #[tokio::test]
    async fn test_liked_videos_most_recent_first() {
        let (ledger, store) = ledger();
        store.zadd("user_like_1", "10", 100.0).await.expect("zadd");
        store.zadd("user_like_1", "20", 300.0).await.expect("zadd");
        store.zadd("user_like_1", "30", 200.0).await.expect("zadd");
        store.zadd("user_like_1", "junk", 50.0).await.expect("zadd");

        assert_eq!(
            ledger.liked_videos(1).await.expect("list"),
            vec![20, 30, 10]
        );
    }

    #[tokio::test]
    async fn test_corrupt_counter_is_an_error() {
        let (ledger, store) = ledger();
        store.set("video_like_5", "many", None).await.expect("set");
        assert!(matches!(
            ledger.video_like_count(5).await,
            Err(Error::DeserializationError(_))
        ));
    }
}
