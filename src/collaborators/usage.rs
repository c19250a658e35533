//! Template usage tracking

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One recorded use of a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageEntry {
    pub template_id: Uuid,
    pub version: u32,
    pub user_id: String,
    pub action: String,
    pub at: DateTime<Utc>,
}

impl UsageEntry {
    pub fn new(template_id: Uuid, version: u32, user_id: &str, action: &str) -> Self {
        Self {
            template_id,
            version,
            user_id: user_id.to_string(),
            action: action.to_string(),
            at: Utc::now(),
        }
    }
}

/// Append-only usage store. Logging must not fail the caller.
pub trait UsageLog: Send + Sync {
    fn log(&self, entry: UsageEntry);

    /// Entries of one template, oldest first
    fn entries(&self, template_id: Uuid) -> Vec<UsageEntry>;
}

/// Usage kept in process memory
#[derive(Default)]
pub struct InMemoryUsageLog {
    entries: DashMap<Uuid, Vec<UsageEntry>>,
}

impl InMemoryUsageLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageLog for InMemoryUsageLog {
    fn log(&self, entry: UsageEntry) {
        self.entries.entry(entry.template_id).or_default().push(entry);
    }

    fn entries(&self, template_id: Uuid) -> Vec<UsageEntry> {
        let mut entries = self
            .entries
            .get(&template_id)
            .map(|e| e.clone())
            .unwrap_or_default();
        entries.sort_by_key(|e| e.at);
        entries
    }
}

/// Aggregated usage of a template over an optional time window
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStatistics {
    pub template_id: Uuid,
    pub total: u64,
    pub unique_users: usize,
    pub by_action: BTreeMap<String, u64>,
    pub by_version: BTreeMap<u32, u64>,
    pub first_used: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
}

impl UsageStatistics {
    /// Summarize the entries whose timestamp falls inside `[start, end]`
    pub fn summarize(
        template_id: Uuid,
        entries: &[UsageEntry],
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Self {
        let mut stats = Self {
            template_id,
            ..Self::default()
        };
        let mut users = HashSet::new();

        let in_window = entries.iter().filter(|e| {
            start.map_or(true, |s| e.at >= s) && end.map_or(true, |end| e.at <= end)
        });
        for entry in in_window {
            stats.total += 1;
            *stats.by_action.entry(entry.action.clone()).or_default() += 1;
            *stats.by_version.entry(entry.version).or_default() += 1;
            users.insert(entry.user_id.as_str());
            stats.first_used = Some(stats.first_used.map_or(entry.at, |f| f.min(entry.at)));
            stats.last_used = Some(stats.last_used.map_or(entry.at, |l| l.max(entry.at)));
        }

        stats.unique_users = users.len();
        stats
    }
}
