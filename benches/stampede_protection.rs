//! Benchmark for coalescing (stampede protection): 100 concurrent misses on the same key
//! against a mocked origin, run through the full pipeline handler.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use cache_proxy::config::Config;
use cache_proxy::error::OriginError;
use cache_proxy::near_cache::MokaNearTier;
use cache_proxy::scheduler::TokioScheduler;
use cache_proxy::server::ProxyState;
use cache_proxy::store::TwoTierStore;
use cache_proxy::testing::InMemoryFarTier;
use cache_proxy::traits::{OriginClient, OriginResponse, Scheduler};
use cache_proxy::ttl_policy::TtlPolicy;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;
use tokio::runtime::Runtime;
use tokio::task::JoinSet;
use tower::ServiceExt;

struct SlowOrigin {
    delay: Duration,
    calls: Arc<AtomicU64>,
}

#[async_trait]
impl OriginClient for SlowOrigin {
    async fn fetch(&self, _path: &str, _query: Option<&str>) -> Result<OriginResponse, OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(OriginResponse {
            status: 200,
            content_type: "application/json".to_string(),
            body: bytes::Bytes::from(serde_json::to_vec(&json!({"computed": true})).unwrap()),
        })
    }
}

fn runtime() -> Runtime {
    Runtime::new().unwrap_or_else(|_| panic!("failed to create runtime"))
}

fn build_app() -> (Arc<ProxyState>, axum::Router) {
    let config = Config::from_env().expect("env defaults are sufficient for benches");

    let near = Arc::new(MokaNearTier::new(config.l1_cache_maxsize));
    let far = Arc::new(InMemoryFarTier::new());
    let store = Arc::new(TwoTierStore::new(near, far, config.stale_ttl_offset));

    let origin: Arc<dyn OriginClient> = Arc::new(SlowOrigin {
        delay: Duration::from_millis(10),
        calls: Arc::new(AtomicU64::new(0)),
    });

    let ttl_policy = Arc::new(TtlPolicy::from_config(&config));

    let scheduler: Arc<dyn Scheduler> = Arc::new(TokioScheduler::spawn(
        Arc::clone(&store),
        Arc::clone(&origin),
        Arc::clone(&ttl_policy),
        config.scheduler_queue_capacity,
        Duration::from_secs(config.lock_lease_seconds),
    ));

    let forward_client = reqwest::Client::builder()
        .timeout(Duration::from_millis(config.origin_timeout_ms))
        .build()
        .expect("forward client builds");

    let state = Arc::new(ProxyState {
        store,
        origin,
        forward_client,
        origin_url: config.origin_url,
        ttl_policy,
        scheduler,
        skip_paths: config.cache_skip_paths,
        cache_key_include_query: config.cache_key_include_query,
        refresh_mark_ttl_seconds: config.refresh_mark_ttl_seconds,
        lock_lease: Duration::from_secs(config.lock_lease_seconds),
        loser_max_wait: Duration::from_millis(config.loser_max_wait_ms),
    });

    let router = axum::Router::new()
        .fallback(cache_proxy::pipeline::handle)
        .with_state(Arc::clone(&state));

    (state, router)
}

fn bench_stampede_protection(c: &mut Criterion) {
    let rt = runtime();

    c.bench_function("stampede_100_concurrent", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (_state, router) = build_app();
                let mut tasks = JoinSet::new();
                for _ in 0..100 {
                    let router = router.clone();
                    tasks.spawn(async move {
                        router
                            .oneshot(Request::get("/bench/stampede").body(Body::empty()).unwrap())
                            .await
                            .unwrap_or_else(|_| panic!("request failed"))
                    });
                }
                while let Some(result) = tasks.join_next().await {
                    black_box(result.unwrap_or_else(|_| panic!("task panicked")));
                }
            });
        });
    });
}

criterion_group!(benches, bench_stampede_protection);
criterion_main!(benches);
