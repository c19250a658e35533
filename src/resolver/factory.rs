//! Variable cache backend factory

use std::sync::Arc;

use crate::config::CacheConfig;

use super::cache::VariableCache;
use super::memory_cache::MemoryVariableCache;
use super::redis_cache::RedisVariableCache;

/// Create a variable cache based on configuration.
///
/// - `"redis"`: connects to `redis_url`; falls back to memory if unreachable
/// - `"memory"` (default): process-local cache
///
/// ```rust,ignore
/// let cache = create_variable_cache(&settings.cache).await;
/// ```
pub async fn create_variable_cache(settings: &CacheConfig) -> Arc<dyn VariableCache> {
    match settings.backend.as_str() {
        "redis" => match RedisVariableCache::connect(&settings.redis_url, settings.key_prefix.clone())
            .await
        {
            Ok(cache) => {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.key_prefix,
                    "Creating Redis variable cache"
                );
                Arc::new(cache)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Redis cache requested but connection failed, falling back to memory"
                );
                Arc::new(MemoryVariableCache::new())
            }
        },
        "memory" => {
            tracing::info!(backend = "memory", "Creating in-memory variable cache");
            Arc::new(MemoryVariableCache::new())
        }
        other => {
            tracing::warn!(
                backend = %other,
                "Unknown cache backend, falling back to memory"
            );
            Arc::new(MemoryVariableCache::new())
        }
    }
}
