//! Two services sharing one distributed store: an API that records likes and
//! a feed that renders videos with their like counts.
//!
//! Run with `RUST_LOG=debug cargo run --example like_counter` to see tier
//! hits and misses.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tiercache::{
    backend::{DistributedStore, InMemoryStore},
    error::Result,
    repository::InMemoryRepository,
    CacheService, CacheableEntity, LikeLedger, LikeOutcome,
};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Video {
    id: u32,
    user_id: u32,
    title: String,
    play_url: String,
}

impl CacheableEntity for Video {
    fn id(&self) -> u32 {
        self.id
    }

    fn is_populated(&self) -> bool {
        self.user_id != 0 || !self.title.is_empty()
    }
}

const VIDEOS: &str = "video_";

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    println!("=== tiercache: like counter ===\n");

    let store = InMemoryStore::new();
    let api = CacheService::new(store.clone());
    let feed = CacheService::builder(store.clone())
        .with_local_ttl(Duration::from_secs(30))
        .build()?;

    let videos = InMemoryRepository::new();
    for (id, title) in [(7, "cats"), (8, "dogs"), (9, "birds")] {
        videos.insert(Video {
            id,
            user_id: 3,
            title: title.to_string(),
            play_url: format!("https://cdn.example/{}.mp4", id),
        });
    }

    println!("1. Feed renders video 7 (database, then cache):");
    for attempt in 1..=2 {
        let mut video = Video {
            id: 7,
            ..Default::default()
        };
        let found = feed.entities().read(VIDEOS, &mut video, &videos).await?;
        println!(
            "   attempt {}: found={} title={:?} db_fetches={}",
            attempt,
            found,
            video.title,
            videos.fetch_count()
        );
    }

    println!("\n2. User 42 likes videos 7 and 8 through the API:");
    let likes = LikeLedger::new(api.clone());
    for video in [7, 8, 7] {
        match likes.like(42, video, 3).await? {
            LikeOutcome::Applied => println!("   liked {}", video),
            LikeOutcome::Duplicate => println!("   {} already liked, skipped", video),
        }
    }

    println!("\n3. Feed reads counters written by the API:");
    let feed_likes = LikeLedger::new(feed.clone());
    println!(
        "   video 7 likes: {}",
        feed_likes.video_like_count(7).await?
    );
    println!(
        "   author 3 received: {}",
        feed_likes.user_liked_count(3).await?
    );
    println!(
        "   user 42 liked: {:?}",
        feed_likes.liked_videos(42).await?
    );

    println!("\n4. Cached string shared between services:");
    api.strings().write("banner", "spring sale", true).await?;
    println!("   feed sees banner: {:?}", feed.strings().get("banner").await?);

    println!("\n5. Background sync mirrors the like count every 100ms:");
    let handle = api.start_periodic_sync(Duration::from_millis(100), |s: InMemoryStore| async move {
        let count = s.get("video_like_7").await?.unwrap_or_else(|| "0".to_string());
        s.set("video_like_7_snapshot", &count, None).await
    })?;
    tokio::time::sleep(Duration::from_millis(350)).await;
    println!(
        "   runs={} snapshot={:?}",
        handle.runs(),
        store.get("video_like_7_snapshot").await?
    );
    handle.shutdown().await;

    println!("\n6. Unlike and invalidate:");
    likes.unlike(42, 7, 3).await?;
    let video = Video {
        id: 7,
        ..Default::default()
    };
    feed.entities().invalidate(VIDEOS, &video).await?;
    println!(
        "   video 7 likes: {}",
        feed_likes.video_like_count(7).await?
    );

    println!("\n=== done ===");
    Ok(())
}
