//! Background scheduler: refresh tasks run after the response has already been sent to
//! the client, on a bounded fire-and-forget `tokio::spawn` queue.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache_key::CacheKey;
use crate::store::{CacheEntry, TwoTierStore};
use crate::traits::{OriginClient, Scheduler};
use crate::ttl_policy::TtlPolicy;

pub struct TokioScheduler {
    sender: mpsc::Sender<String>,
}

impl TokioScheduler {
    /// Spawns the worker loop that drains the queue and runs refreshes. `store`/`origin`/
    /// `ttl_policy` are shared with the pipeline; `refresh_mark_ttl` controls how long the
    /// near-tier `refresh:K` dedup mark lives once set.
    pub fn spawn(
        store: Arc<TwoTierStore>,
        origin: Arc<dyn OriginClient>,
        ttl_policy: Arc<TtlPolicy>,
        queue_capacity: usize,
        lock_lease: Duration,
    ) -> Self {
        let (sender, mut receiver) = mpsc::channel::<String>(queue_capacity);

        tokio::spawn(async move {
            while let Some(key_str) = receiver.recv().await {
                let key = CacheKey::from_request(&key_str, None, false);
                refresh_one(&key, &store, origin.as_ref(), &ttl_policy, lock_lease).await;
            }
        });

        Self { sender }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_refresh(&self, key: String) {
        if self.sender.try_send(key.clone()).is_err() {
            warn!(key = %key, "refresh queue full, dropping task (refresh mark will self-heal)");
        }
    }
}

async fn refresh_one(
    key: &CacheKey,
    store: &TwoTierStore,
    origin: &dyn OriginClient,
    ttl_policy: &TtlPolicy,
    lock_lease: Duration,
) {
    let owner_token = Uuid::new_v4().to_string();
    let acquired = store.acquire_lock(key, &owner_token, lock_lease).await;
    if !acquired {
        debug!(key = %key, "another worker already refreshing, skipping");
        store.near().clear_marker(&key.refresh_mark_key()).await;
        return;
    }

    let path = key.as_str();
    match origin.fetch(path, None).await {
        Ok(response) => {
            if let Ok(body) = serde_json::from_slice::<serde_json::Value>(&response.body) {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                let ttl = ttl_policy.resolve(path, response.status, &response.content_type);
                if ttl > 0 {
                    let entry = CacheEntry {
                        content_type: response.content_type,
                        status: response.status,
                        body,
                        stored_at: now,
                        ttl,
                    };
                    store.set(key, entry, ttl, now).await;
                }
            }
        }
        Err(err) => {
            warn!(key = %key, error = %err, "background refresh failed");
        }
    }

    store.release_lock(key, &owner_token).await;
    store.near().clear_marker(&key.refresh_mark_key()).await;
}
