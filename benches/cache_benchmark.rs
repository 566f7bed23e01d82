use criterion::{criterion_group, criterion_main, Criterion};
use serde::{Deserialize, Serialize};
use std::hint::black_box;
use tiercache::backend::{DistributedStore, InMemoryStore};
use tiercache::repository::InMemoryRepository;
use tiercache::{CacheService, CacheableEntity, LikeLedger};
use tokio::runtime::Runtime;

#[derive(Clone, Default, Serialize, Deserialize)]
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
        self.user_id != 0
    }
}

fn runtime() -> Runtime {
    Runtime::new().expect("tokio runtime")
}

fn bench_strings(c: &mut Criterion) {
    let rt = runtime();
    let store = InMemoryStore::new();
    let warm = CacheService::new(store.clone());
    rt.block_on(warm.strings().write("banner", "spring sale", true))
        .expect("seed");

    c.bench_function("strings/local_hit", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(warm.strings().get("banner").await.expect("get"));
        });
    });

    c.bench_function("strings/distributed_hit", |b| {
        b.to_async(&rt).iter(|| async {
            // Fresh service each time so the local tier is empty.
            let cold = CacheService::new(store.clone());
            black_box(cold.strings().get("banner").await.expect("get"));
        });
    });
}

fn bench_entities(c: &mut Criterion) {
    let rt = runtime();
    let store = InMemoryStore::new();
    let repo = InMemoryRepository::new();
    repo.insert(Video {
        id: 7,
        user_id: 3,
        title: "cats".to_string(),
        play_url: "https://cdn.example/7.mp4".to_string(),
    });

    let warm = CacheService::new(store.clone());
    let mut seed = Video {
        id: 7,
        ..Default::default()
    };
    rt.block_on(warm.entities().read("video_", &mut seed, &repo))
        .expect("seed");

    c.bench_function("entities/local_hit", |b| {
        b.to_async(&rt).iter(|| async {
            let mut video = Video {
                id: 7,
                ..Default::default()
            };
            black_box(
                warm.entities()
                    .read("video_", &mut video, &repo)
                    .await
                    .expect("read"),
            );
        });
    });

    c.bench_function("entities/distributed_hit", |b| {
        b.to_async(&rt).iter(|| async {
            let cold = CacheService::new(store.clone());
            let mut video = Video {
                id: 7,
                ..Default::default()
            };
            black_box(
                cold.entities()
                    .read("video_", &mut video, &repo)
                    .await
                    .expect("read"),
            );
        });
    });
}

fn bench_likes(c: &mut Criterion) {
    let rt = runtime();
    let store = InMemoryStore::new();
    let ledger = LikeLedger::new(CacheService::new(store.clone()));

    c.bench_function("counter/like_unlike", |b| {
        b.to_async(&rt).iter(|| async {
            ledger.like(42, 7, 3).await.expect("like");
            ledger.unlike(42, 7, 3).await.expect("unlike");
        });
    });

    c.bench_function("counter/read_count", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(store.get("video_like_7").await.expect("get"));
        });
    });
}

criterion_group!(benches, bench_strings, bench_entities, bench_likes);
criterion_main!(benches);
