//! Shared test harness: setup helpers, a `test_data` module, and a `wait_for` polling helper,
//! backed by an in-memory fake `FarTier` since a live Redis is not assumed to be available
//! wherever this suite runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Router;
use cache_proxy::config::Config;
use cache_proxy::near_cache::MokaNearTier;
use cache_proxy::origin::ReqwestOriginClient;
use cache_proxy::scheduler::TokioScheduler;
use cache_proxy::server::ProxyState;
use cache_proxy::store::TwoTierStore;
use cache_proxy::testing::InMemoryFarTier;
use cache_proxy::traits::{OriginClient, Scheduler};
use cache_proxy::ttl_policy::TtlPolicy;

/// Counts origin fetches without depending on wiremock's own call-count assertions, so
/// stampede tests can assert on it directly.
pub struct CountingOriginClient {
    inner: ReqwestOriginClient,
    pub calls: Arc<AtomicU64>,
}

#[async_trait]
impl OriginClient for CountingOriginClient {
    async fn fetch(
        &self,
        path: &str,
        query: Option<&str>,
    ) -> Result<cache_proxy::traits::OriginResponse, cache_proxy::error::OriginError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.fetch(path, query).await
    }
}

/// Builds a full `ProxyState`/`Router` pair pointed at `origin_base_url` (typically a
/// `wiremock::MockServer`'s URI), backed by the in-memory far tier.
pub fn build_test_app(origin_base_url: &str) -> (Arc<ProxyState>, Arc<AtomicU64>, Router) {
    let mut config = Config::from_env().expect("env defaults are sufficient for tests");
    config.origin_url = origin_base_url.to_string();
    config.cache_default_ttl = 1;
    config.stale_ttl_offset = 10;
    config.lock_lease_seconds = 5;
    config.loser_max_wait_ms = 2000;

    let near = Arc::new(MokaNearTier::new(config.l1_cache_maxsize));
    let far = Arc::new(InMemoryFarTier::new());
    let store = Arc::new(TwoTierStore::new(near, far, config.stale_ttl_offset));

    let calls = Arc::new(AtomicU64::new(0));
    let origin: Arc<dyn OriginClient> = Arc::new(CountingOriginClient {
        inner: ReqwestOriginClient::new(
            config.origin_url.clone(),
            Duration::from_millis(config.origin_timeout_ms),
        ),
        calls: Arc::clone(&calls),
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
        .route("/health", axum::routing::get(cache_proxy::health::handle))
        .fallback(cache_proxy::pipeline::handle)
        .with_state(Arc::clone(&state));

    (state, calls, router)
}

/// Polls `condition` until it returns true or `timeout_ms` elapses.
pub async fn wait_for<F: FnMut() -> bool>(mut condition: F, timeout_ms: u64) -> bool {
    let start = Instant::now();
    let timeout = Duration::from_millis(timeout_ms);
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

pub mod test_data {
    use serde_json::{json, Value};

    pub fn json_user(id: u64) -> Value {
        json!({ "id": id, "name": format!("User {id}") })
    }
}
