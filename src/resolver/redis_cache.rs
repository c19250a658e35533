//! Redis-backed variable cache.
//!
//! Lets several service instances share resolved variable values. Keys are
//! stored as `{prefix}:{key}` with `SET .. EX`. Redis failures are logged and
//! treated as cache misses.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::cache::{CacheStats, VariableCache};

/// Redis variable cache
pub struct RedisVariableCache {
    /// Auto-reconnecting connection (cheap to clone)
    connection: ConnectionManager,

    /// Key prefix for Redis keys
    prefix: String,
}

impl RedisVariableCache {
    /// Connect to Redis and build the cache
    pub async fn connect(url: &str, prefix: impl Into<String>) -> redis::RedisResult<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self {
            connection,
            prefix: prefix.into(),
        })
    }

    fn redis_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl VariableCache for RedisVariableCache {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection.clone();
        match conn.get::<_, Option<String>>(self.redis_key(key)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, key = %key, "Redis cache read failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut conn = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        if let Err(e) = conn
            .set_ex::<_, _, ()>(self.redis_key(key), value, seconds)
            .await
        {
            tracing::warn!(error = %e, key = %key, "Redis cache write failed");
        }
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        let mut conn = self.connection.clone();
        let pattern = format!("{}*", self.redis_key(prefix));

        let keys: Vec<String> = match conn.scan_match::<_, String>(&pattern).await {
            Ok(iter) => iter.collect().await,
            Err(e) => {
                tracing::warn!(error = %e, prefix = %prefix, "Redis cache scan failed");
                return;
            }
        };
        if keys.is_empty() {
            return;
        }

        if let Err(e) = conn.del::<_, ()>(keys).await {
            tracing::warn!(error = %e, prefix = %prefix, "Redis cache invalidation failed");
        }
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            backend_type: "redis".to_string(),
            entries: None,
        }
    }
}
