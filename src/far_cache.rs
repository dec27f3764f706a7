//! Shared far tier backed by Redis, plus the compare-and-delete lock script used by the
//! coalescer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::codec::{decode_frame, encode_frame};
use crate::error::StoreError;
use crate::store::CacheEntry;
use crate::traits::FarTier;

/// Deletes `KEYS[1]` only if its current value equals `ARGV[1]`. Evaluated server-side so the
/// compare-and-delete is atomic with respect to other clients racing to release or steal the
/// same lock.
const RELEASE_LOCK_SCRIPT: &str = r"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
";

pub struct RedisFarTier {
    conn_manager: ConnectionManager,
    release_script: Script,
    /// Bounds the number of far-tier round-trips in flight at once, standing in for a
    /// connection pool's own size limit (`ConnectionManager` multiplexes a single connection).
    pool: Arc<Semaphore>,
    call_timeout: Duration,
}

impl RedisFarTier {
    /// # Errors
    ///
    /// Returns an error if the client cannot be constructed or the initial connection/PING
    /// fails.
    pub async fn connect(
        redis_url: &str,
        call_timeout: Duration,
        pool_size: u32,
    ) -> anyhow::Result<Self> {
        info!(redis_url = %redis_url, pool_size, "connecting to Redis far tier");
        let client = Client::open(redis_url)?;
        let conn_manager = ConnectionManager::new(client).await?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis far tier connected");

        Ok(Self {
            conn_manager,
            release_script: Script::new(RELEASE_LOCK_SCRIPT),
            pool: Arc::new(Semaphore::new(pool_size.max(1) as usize)),
            call_timeout,
        })
    }

    /// Runs `f` with a far-tier round-trip deadline, bounded to at most `pool_size` concurrent
    /// callers. A timeout or a closed semaphore both degrade to a transport error, matching the
    /// disposition for any other far-tier failure.
    async fn with_deadline<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: std::future::Future<Output = Result<T, StoreError>>,
    {
        let _permit = self
            .pool
            .acquire()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        match tokio::time::timeout(self.call_timeout, f).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = self.call_timeout.as_millis(), "far tier call timed out");
                Err(StoreError::Transport("far tier call timed out".to_string()))
            }
        }
    }
}

#[async_trait]
impl FarTier for RedisFarTier {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        self.with_deadline(async {
            let mut conn = self.conn_manager.clone();
            let raw: Option<Vec<u8>> = conn
                .get(key)
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            match raw {
                Some(bytes) if !bytes.is_empty() => decode_frame(&bytes).map(Some),
                _ => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), StoreError> {
        let frame = encode_frame(entry)?;
        self.with_deadline(async {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .set_ex(key, frame, ttl.as_secs().max(1))
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            debug!(key = %key, ttl_secs = ttl.as_secs(), "wrote far tier entry");
            Ok(())
        })
        .await
    }

    async fn get_ttl_remaining(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.with_deadline(async {
            let mut conn = self.conn_manager.clone();
            let ttl_secs: i64 = redis::cmd("TTL")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            Ok((ttl_secs > 0).then(|| Duration::from_secs(ttl_secs.unsigned_abs())))
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.with_deadline(async {
            let mut conn = self.conn_manager.clone();
            let _: () = conn
                .del(key)
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn acquire_lock(
        &self,
        key: &str,
        owner_token: &str,
        lease: Duration,
    ) -> Result<bool, StoreError> {
        self.with_deadline(async {
            let mut conn = self.conn_manager.clone();
            let acquired: bool = redis::cmd("SET")
                .arg(key)
                .arg(owner_token)
                .arg("NX")
                .arg("EX")
                .arg(lease.as_secs().max(1))
                .query_async::<Option<String>>(&mut conn)
                .await
                .map(|reply| reply.is_some())
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            Ok(acquired)
        })
        .await
    }

    async fn release_lock(&self, key: &str, owner_token: &str) -> Result<bool, StoreError> {
        self.with_deadline(async {
            let mut conn = self.conn_manager.clone();
            let deleted: i64 = self
                .release_script
                .key(key)
                .arg(owner_token)
                .invoke_async(&mut conn)
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            Ok(deleted == 1)
        })
        .await
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.conn_manager.clone();
        tokio::time::timeout(
            self.call_timeout,
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false)
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}
