//! Coalescer: ensures at most one origin fetch per key is in flight, using the far
//! tier's lock as the rendezvous point instead of a process-local guard, so the guarantee
//! holds best-effort across instances too.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache_key::CacheKey;
use crate::store::{CacheEntry, Lookup, TwoTierStore};
use crate::traits::{OriginClient, OriginResponse};
use crate::ttl_policy::TtlPolicy;

pub struct Coalescer<'a> {
    pub store: &'a TwoTierStore,
    pub origin: &'a dyn OriginClient,
    pub ttl_policy: &'a TtlPolicy,
    pub lock_lease: Duration,
    pub loser_max_wait: Duration,
}

fn now_epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl Coalescer<'_> {
    /// Runs the miss protocol for `key`, returning the response to serve. `path`/`query` are
    /// forwarded to the origin; `request_max_age` clamps the write TTL per the request's own
    /// `Cache-Control: max-age` directive. `no_cache` forces an origin fetch even if a winner's
    /// double-checked lookup would otherwise find a fresh entry (the request asked to revalidate).
    pub async fn resolve_miss(
        &self,
        key: &CacheKey,
        path: &str,
        query: Option<&str>,
        request_max_age: Option<u64>,
        no_cache: bool,
    ) -> Result<OriginResponse, crate::error::OriginError> {
        let owner_token = Uuid::new_v4().to_string();
        let acquired = self.store.acquire_lock(key, &owner_token, self.lock_lease).await;

        if acquired {
            debug!(key = %key, "acquired coalescing lock, fetching from origin");
            let result = self
                .winner_fetch(key, path, query, request_max_age, no_cache)
                .await;
            self.store.release_lock(key, &owner_token).await;
            return result;
        }

        self.loser_wait(key, path, query).await
    }

    async fn winner_fetch(
        &self,
        key: &CacheKey,
        path: &str,
        query: Option<&str>,
        request_max_age: Option<u64>,
        no_cache: bool,
    ) -> Result<OriginResponse, crate::error::OriginError> {
        // Double-checked lookup: another winner may have populated the store between our
        // initial miss and acquiring the lock. Skipped under `no_cache`, which asks for
        // revalidation and must always reach the origin.
        let now = now_epoch_seconds();
        if !no_cache {
            if let Lookup::HitFresh(entry) = self.store.get(key, now).await {
                return Ok(entry_to_response(entry));
            }
        }

        let response = self.origin.fetch(path, query).await?;

        let is_json = response
            .content_type
            .split(';')
            .next()
            .unwrap_or(&response.content_type)
            .trim()
            .ends_with("json");

        if is_json {
            match serde_json::from_slice::<serde_json::Value>(&response.body) {
                Ok(body) => {
                    let mut ttl =
                        self.ttl_policy
                            .resolve(path, response.status, &response.content_type);
                    if let Some(max_age) = request_max_age {
                        ttl = ttl.min(max_age);
                    }
                    if ttl > 0 {
                        let entry = CacheEntry {
                            content_type: response.content_type.clone(),
                            status: response.status,
                            body,
                            stored_at: now,
                            ttl,
                        };
                        self.store.set(key, entry, ttl, now).await;
                    }
                }
                Err(err) => {
                    debug!(key = %key, error = %err, "origin body did not decode as JSON, serving uncached");
                }
            }
        }

        Ok(response)
    }

    async fn loser_wait(
        &self,
        key: &CacheKey,
        path: &str,
        query: Option<&str>,
    ) -> Result<OriginResponse, crate::error::OriginError> {
        let start = tokio::time::Instant::now();
        let backoff = Duration::from_millis(20);

        while start.elapsed() < self.loser_max_wait {
            tokio::time::sleep(backoff).await;
            let now = now_epoch_seconds();
            match self.store.get(key, now).await {
                Lookup::HitFresh(entry) | Lookup::HitStale(entry) => {
                    return Ok(entry_to_response(entry));
                }
                Lookup::Miss => continue,
            }
        }

        warn!(key = %key, "gave up waiting on coalescing winner, fetching directly");
        self.origin.fetch(path, query).await
    }
}

fn entry_to_response(entry: CacheEntry) -> OriginResponse {
    let body = serde_json::to_vec(&entry.body).unwrap_or_default();
    OriginResponse {
        status: entry.status,
        content_type: entry.content_type,
        body: bytes::Bytes::from(body),
    }
}
