//! Wires a `Config` into concrete tiers, an origin client and a scheduler, and builds the axum
//! `Router`.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::far_cache::RedisFarTier;
use crate::health;
use crate::near_cache::MokaNearTier;
use crate::origin::ReqwestOriginClient;
use crate::pipeline;
use crate::scheduler::TokioScheduler;
use crate::store::TwoTierStore;
use crate::traits::{OriginClient, Scheduler};
use crate::ttl_policy::TtlPolicy;

pub struct ProxyState {
    pub store: Arc<TwoTierStore>,
    pub origin: Arc<dyn OriginClient>,
    pub forward_client: reqwest::Client,
    pub origin_url: String,
    pub ttl_policy: Arc<TtlPolicy>,
    pub scheduler: Arc<dyn Scheduler>,
    pub skip_paths: Vec<String>,
    pub cache_key_include_query: bool,
    pub refresh_mark_ttl_seconds: u64,
    pub lock_lease: Duration,
    pub loser_max_wait: Duration,
}

pub struct ProxySystemBuilder {
    config: Config,
}

impl ProxySystemBuilder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// # Errors
    ///
    /// Returns an error if the far tier cannot be reached at startup.
    pub async fn build(self) -> anyhow::Result<(Arc<ProxyState>, Router)> {
        let config = self.config;

        let far = Arc::new(
            RedisFarTier::connect(
                &config.redis_url,
                Duration::from_millis(config.far_tier_timeout_ms),
                config.far_tier_pool_size,
            )
            .await?,
        );
        let near = Arc::new(MokaNearTier::new(config.l1_cache_maxsize));
        let store = Arc::new(TwoTierStore::new(near, far, config.stale_ttl_offset));

        let origin: Arc<dyn OriginClient> = Arc::new(ReqwestOriginClient::new(
            config.origin_url.clone(),
            Duration::from_millis(config.origin_timeout_ms),
        ));

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
            .build()?;

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

        let router = Router::new()
            .route("/health", get(health::handle))
            .fallback(pipeline::handle)
            .layer(TraceLayer::new_for_http())
            .with_state(Arc::clone(&state));

        Ok((state, router))
    }
}
