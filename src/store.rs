//! Two-tier store: near tier backed by the far tier, fresh/stale key pairing.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache_key::CacheKey;
use crate::traits::{FarTier, NearTier};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub content_type: String,
    pub status: u16,
    pub body: serde_json::Value,
    pub stored_at: u64,
    pub ttl: u64,
}

impl CacheEntry {
    pub fn expires_at(&self) -> u64 {
        self.stored_at.saturating_add(self.ttl)
    }

    pub fn is_fresh(&self, now: u64) -> bool {
        now < self.expires_at()
    }
}

pub enum Lookup {
    HitFresh(CacheEntry),
    HitStale(CacheEntry),
    Miss,
}

pub struct TwoTierStore {
    near: Arc<dyn NearTier>,
    far: Arc<dyn FarTier>,
    stale_ttl_offset: u64,
}

impl TwoTierStore {
    pub fn new(near: Arc<dyn NearTier>, far: Arc<dyn FarTier>, stale_ttl_offset: u64) -> Self {
        Self {
            near,
            far,
            stale_ttl_offset,
        }
    }

    pub async fn get(&self, key: &CacheKey, now: u64) -> Lookup {
        if let Some(entry) = self.near.get(key.as_str()).await {
            if entry.is_fresh(now) {
                return Lookup::HitFresh(entry);
            }
            self.near.remove(key.as_str()).await;
        }

        match self.far.get(key.as_str()).await {
            Ok(Some(entry)) => {
                let remaining = entry.expires_at().saturating_sub(now);
                if remaining > 0 {
                    self.near
                        .set(key.as_str(), entry.clone(), Duration::from_secs(remaining))
                        .await;
                    return Lookup::HitFresh(entry);
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!(key = %key, error = %err, "far tier read failed, degrading to miss");
            }
        }

        match self.far.get(&key.stale_key()).await {
            Ok(Some(entry)) => Lookup::HitStale(entry),
            Ok(None) => Lookup::Miss,
            Err(err) => {
                warn!(key = %key, error = %err, "far tier stale read failed, degrading to miss");
                Lookup::Miss
            }
        }
    }

    pub async fn set(&self, key: &CacheKey, mut entry: CacheEntry, ttl: u64, now: u64) {
        if ttl == 0 {
            return;
        }
        entry.stored_at = now;
        entry.ttl = ttl;

        self.near
            .set(key.as_str(), entry.clone(), Duration::from_secs(ttl))
            .await;

        if let Err(err) = self
            .far
            .set(key.as_str(), &entry, Duration::from_secs(ttl))
            .await
        {
            warn!(key = %key, error = %err, "far tier fresh write failed, response still served");
            return;
        }

        let stale_ttl = ttl.saturating_add(self.stale_ttl_offset);
        if let Err(err) = self
            .far
            .set(&key.stale_key(), &entry, Duration::from_secs(stale_ttl))
            .await
        {
            warn!(key = %key, error = %err, "far tier stale write failed");
        }

        debug!(key = %key, ttl, "stored cache entry");
    }

    pub async fn acquire_lock(&self, key: &CacheKey, owner_token: &str, lease: Duration) -> bool {
        self.far
            .acquire_lock(&key.lock_key(), owner_token, lease)
            .await
            .unwrap_or_else(|err| {
                warn!(key = %key, error = %err, "lock acquisition failed, treating as not acquired");
                false
            })
    }

    pub async fn release_lock(&self, key: &CacheKey, owner_token: &str) {
        if let Err(err) = self.far.release_lock(&key.lock_key(), owner_token).await {
            warn!(key = %key, error = %err, "lock release failed");
        }
    }

    pub fn near(&self) -> &Arc<dyn NearTier> {
        &self.near
    }

    pub fn far(&self) -> &Arc<dyn FarTier> {
        &self.far
    }
}
