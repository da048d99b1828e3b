use crate::core::cache::VolatileStore;
use crate::core::error::{MarketDataError, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::time::Duration;
use tracing::debug;

/// Volatile store backed by Redis.
pub struct RedisStore {
    connection: MultiplexedConnection,
}

impl RedisStore {
    /// Opens a multiplexed connection and verifies it with a `PING`.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let mut connection = tokio::time::timeout(timeout, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| MarketDataError::cache(format!("timed out connecting to {url}")))??;
        let _: String = redis::cmd("PING").query_async(&mut connection).await?;
        debug!("Redis connection established to {}", url);
        Ok(Self { connection })
    }
}

#[async_trait]
impl VolatileStore for RedisStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = conn.get(key).await?;
        debug!(
            "Cache {} for key: {}",
            if value.is_some() { "HIT" } else { "MISS" },
            key
        );
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        debug!("Cache PUT for key: {}", key);
        Ok(())
    }

    async fn clear(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn.scan_match::<_, String>(pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: u64 = conn.del(&keys).await?;
        debug!("Cache CLEAR for pattern {}: {} removed", pattern, removed);
        Ok(removed)
    }
}
