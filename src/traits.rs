//! Capability traits the pipeline is built against. Concrete backends are chosen once at
//! construction (see `server.rs`); the pipeline never reaches for a concrete type.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{OriginError, StoreError};
use crate::store::CacheEntry;

/// The process-local tier. Implementations must be cheap to clone and safe to share across
/// tasks (the production implementation wraps a `moka::future::Cache`).
#[async_trait]
pub trait NearTier: Send + Sync {
    async fn get(&self, key: &str) -> Option<CacheEntry>;
    async fn set(&self, key: &str, entry: CacheEntry, ttl: Duration);
    async fn remove(&self, key: &str);

    /// Sets `key` to a sentinel value with the given TTL only if absent. Returns `true` when
    /// this call is the one that set it (used for the `refresh:K` dedup mark).
    async fn set_if_absent_marker(&self, key: &str, ttl: Duration) -> bool;
    async fn clear_marker(&self, key: &str);

    fn name(&self) -> &'static str;
}

/// The shared, out-of-process tier plus the coalescing lock primitive.
#[async_trait]
pub trait FarTier: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;
    async fn set(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), StoreError>;
    async fn get_ttl_remaining(&self, key: &str) -> Result<Option<Duration>, StoreError>;
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Set-if-absent on `lock:K`. Returns `true` on success.
    async fn acquire_lock(
        &self,
        key: &str,
        owner_token: &str,
        lease: Duration,
    ) -> Result<bool, StoreError>;

    /// Compare-and-delete: removes `lock:K` only if its value equals `owner_token`.
    async fn release_lock(&self, key: &str, owner_token: &str) -> Result<bool, StoreError>;

    async fn health_check(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// `body` is the raw response payload. The origin client never attempts JSON decoding itself —
/// that only happens where the pipeline needs a `serde_json::Value` to cache, so a
/// binary body (e.g. an image) is never misreported as a decode failure.
#[derive(Debug, Clone)]
pub struct OriginResponse {
    pub status: u16,
    pub content_type: String,
    pub body: bytes::Bytes,
}

#[async_trait]
pub trait OriginClient: Send + Sync {
    async fn fetch(&self, path: &str, query: Option<&str>) -> Result<OriginResponse, OriginError>;
}

/// A fire-and-forget background task runner. `schedule_refresh` never blocks the caller; when
/// the internal queue is full the task is dropped and logged (the `refresh:K` mark self-heals).
pub trait Scheduler: Send + Sync {
    fn schedule_refresh(&self, key: String);
}
