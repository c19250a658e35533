//! In-memory variable cache using DashMap.
//!
//! Entries are lost on restart. Expiry is measured on the tokio clock so it
//! can be driven deterministically in tests.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;

use super::cache::{CacheStats, VariableCache};

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// In-memory variable cache.
///
/// Expired entries are evicted lazily on read and by `purge_expired`.
#[derive(Default)]
pub struct MemoryVariableCache {
    entries: DashMap<String, CacheEntry>,
}

impl MemoryVariableCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            tracing::debug!(removed = removed, "Purged expired variable cache entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VariableCache for MemoryVariableCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }

        // Expired: evict unless a writer refreshed it in the meantime
        self.entries.remove_if(key, |_, entry| entry.expires_at <= now);
        None
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    async fn invalidate_prefix(&self, prefix: &str) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            backend_type: "memory".to_string(),
            entries: Some(self.entries.len()),
        }
    }
}
