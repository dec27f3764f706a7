//! In-process near tier backed by Moka. Moka's own `time_to_live` is a single cache-wide
//! duration, so per-key TTLs are wrapped in a manual-expiry slot and enforced on read instead.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;

use crate::store::CacheEntry;
use crate::traits::NearTier;

struct Slot {
    entry: CacheEntry,
    expires_at: Instant,
}

impl Slot {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

pub struct MokaNearTier {
    cache: Cache<String, Arc<Slot>>,
    markers: DashMap<String, Instant>,
}

impl MokaNearTier {
    pub fn new(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).build(),
            markers: DashMap::new(),
        }
    }
}

#[async_trait]
impl NearTier for MokaNearTier {
    async fn get(&self, key: &str) -> Option<CacheEntry> {
        match self.cache.get(key).await {
            Some(slot) if !slot.is_expired() => Some(slot.entry.clone()),
            Some(_) => {
                self.cache.invalidate(key).await;
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, entry: CacheEntry, ttl: Duration) {
        self.cache
            .insert(
                key.to_string(),
                Arc::new(Slot {
                    entry,
                    expires_at: Instant::now() + ttl,
                }),
            )
            .await;
    }

    async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    async fn set_if_absent_marker(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut inserted = false;
        self.markers
            .entry(key.to_string())
            .and_modify(|expires_at| {
                if now >= *expires_at {
                    *expires_at = now + ttl;
                    inserted = true;
                }
            })
            .or_insert_with(|| {
                inserted = true;
                now + ttl
            });
        inserted
    }

    async fn clear_marker(&self, key: &str) {
        self.markers.remove(key);
    }

    fn name(&self) -> &'static str {
        "Moka"
    }
}
