//! TTL cache for reference-knowledge-base labels.
//!
//! Looking up display labels for reference entities is comparatively slow
//! and their values change rarely, so resolved labels are kept for a bounded
//! time. The cache is an owned value behind an explicit get/put interface,
//! not process-wide mutable state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default time-to-live for cached labels (7 days).
pub const DEFAULT_LABEL_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// A cached label with its optional description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedLabel {
    pub label: String,
    pub description: Option<String>,
    cached_at: Instant,
}

/// Bounded-lifetime store of reference entity labels.
#[derive(Debug)]
pub struct LabelCache {
    ttl: Duration,
    entries: HashMap<String, CachedLabel>,
}

impl LabelCache {
    /// Creates a cache with the default TTL.
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_LABEL_TTL)
    }

    /// Creates a cache with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the entry for `key` if it exists and has not expired.
    pub fn get(&self, key: &str) -> Option<&CachedLabel> {
        self.entries
            .get(key)
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
    }

    /// Stores a label, replacing any previous entry and refreshing its age.
    pub fn put(&mut self, key: impl Into<String>, label: impl Into<String>, description: Option<String>) {
        self.entries.insert(
            key.into(),
            CachedLabel {
                label: label.into(),
                description,
                cached_at: Instant::now(),
            },
        );
    }

    /// Drops every expired entry.
    pub fn purge_expired(&mut self) {
        let ttl = self.ttl;
        self.entries
            .retain(|_, entry| entry.cached_at.elapsed() < ttl);
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for LabelCache {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let mut cache = LabelCache::new();
        cache.put("Q42", "Douglas Adams", Some("English writer".into()));

        let entry = cache.get("Q42").expect("entry should be present");
        assert_eq!(entry.label, "Douglas Adams");
        assert_eq!(entry.description.as_deref(), Some("English writer"));
    }

    #[test]
    fn missing_key_is_none() {
        let cache = LabelCache::new();
        assert!(cache.get("Q1").is_none());
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let mut cache = LabelCache::with_ttl(Duration::from_millis(1));
        cache.put("Q42", "Douglas Adams", None);

        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("Q42").is_none());
    }

    #[test]
    fn put_refreshes_age() {
        let mut cache = LabelCache::with_ttl(Duration::from_millis(50));
        cache.put("Q42", "Old", None);

        std::thread::sleep(Duration::from_millis(30));
        cache.put("Q42", "New", None);

        std::thread::sleep(Duration::from_millis(30));
        // 60ms after the first put, but only 30ms after the refresh
        let entry = cache.get("Q42").expect("refreshed entry should live");
        assert_eq!(entry.label, "New");
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let mut cache = LabelCache::with_ttl(Duration::from_millis(20));
        cache.put("old", "Old", None);

        std::thread::sleep(Duration::from_millis(25));
        cache.put("fresh", "Fresh", None);

        assert_eq!(cache.len(), 2);
        cache.purge_expired();
        assert_eq!(cache.len(), 1);
        assert!(cache.get("fresh").is_some());
        assert!(cache.get("old").is_none());
    }
}
