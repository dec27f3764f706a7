//! An in-memory `FarTier` used by the test suite and benchmarks, since a live Redis is not
//! assumed to be available wherever this suite runs. Backed by a `Mutex<HashMap>` instead of a
//! Redis connection.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::StoreError;
use crate::store::CacheEntry;
use crate::traits::FarTier;

struct Slot {
    entry: CacheEntry,
    expires_at: Instant,
}

struct LockSlot {
    owner_token: String,
    expires_at: Instant,
}

#[derive(Default)]
pub struct InMemoryFarTier {
    values: Mutex<HashMap<String, Slot>>,
    locks: Mutex<HashMap<String, LockSlot>>,
}

impl InMemoryFarTier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FarTier for InMemoryFarTier {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let mut values = self.values.lock().expect("lock poisoned");
        if let Some(slot) = values.get(key) {
            if Instant::now() >= slot.expires_at {
                values.remove(key);
                return Ok(None);
            }
            return Ok(Some(slot.entry.clone()));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), StoreError> {
        self.values.lock().expect("lock poisoned").insert(
            key.to_string(),
            Slot {
                entry: entry.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn get_ttl_remaining(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let values = self.values.lock().expect("lock poisoned");
        Ok(values
            .get(key)
            .map(|slot| slot.expires_at.saturating_duration_since(Instant::now())))
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.values.lock().expect("lock poisoned").remove(key);
        Ok(())
    }

    async fn acquire_lock(
        &self,
        key: &str,
        owner_token: &str,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        let mut locks = self.locks.lock().expect("lock poisoned");
        if let Some(existing) = locks.get(key) {
            if Instant::now() < existing.expires_at {
                return Ok(false);
            }
        }
        locks.insert(
            key.to_string(),
            LockSlot {
                owner_token: owner_token.to_string(),
                expires_at: Instant::now() + lease,
            },
        );
        Ok(true)
    }

    async fn release_lock(&self, key: &str, owner_token: &str) -> Result<bool, StoreError> {
        let mut locks = self.locks.lock().expect("lock poisoned");
        if locks.get(key).map(|slot| slot.owner_token.as_str()) == Some(owner_token) {
            locks.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn health_check(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "InMemory"
    }
}
