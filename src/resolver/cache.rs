//! Backend trait for the variable value cache.
//!
//! The resolver only talks to this trait, so the in-process cache can be
//! swapped for a shared one without changing resolution semantics.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

/// Statistics about a cache backend
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    /// Backend type identifier
    pub backend_type: String,

    /// Number of live entries, when the backend can tell cheaply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entries: Option<usize>,
}

/// Key/value store with per-entry expiry.
///
/// Cached values are advisory: a failing backend behaves like a miss and
/// concurrent writers to the same key race under last-writer-wins.
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared
/// across concurrent renders.
#[async_trait]
pub trait VariableCache: Send + Sync {
    /// Backend type identifier
    fn backend_name(&self) -> &'static str;

    /// Get a live entry
    async fn get(&self, key: &str) -> Option<String>;

    /// Store an entry, restarting its time-to-live
    async fn set(&self, key: &str, value: &str, ttl: Duration);

    /// Remove every entry whose key starts with `prefix`
    async fn invalidate_prefix(&self, prefix: &str);

    /// Get cache statistics
    async fn stats(&self) -> CacheStats;
}
