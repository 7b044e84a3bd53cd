//! Per-session response cache.
//!
//! Keys are the normalized form of the user's original query: every
//! character that is not a letter, digit, or underscore is stripped and
//! the rest is upper-cased. Queries that differ only in case or
//! punctuation therefore share an entry.
//!
//! The cache is a fixed-capacity FIFO. When an insert would push it past
//! capacity, the oldest `eviction_batch` entries are dropped in one go.
//! The batch defaults to a tenth of the capacity.

use std::collections::{HashMap, VecDeque};

/// Normalize a query into its cache key.
pub fn normalize_key(query: &str) -> String {
    query
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    entries: HashMap<String, String>,
    /// Keys in insertion order, oldest first
    order: VecDeque<String>,
    capacity: usize,
    eviction_batch: usize,
}

impl ResponseCache {
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// Create a cache holding at most `capacity` entries that evicts the
    /// oldest tenth of them when full.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(capacity, Self::default_eviction_batch(capacity))
    }

    /// Create a cache holding at most `capacity` entries (at least 1).
    /// `eviction_batch` is clamped to `1..=capacity`.
    pub fn new(capacity: usize, eviction_batch: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            eviction_batch: eviction_batch.clamp(1, capacity),
        }
    }

    /// Ten percent of `capacity`, never less than one entry.
    pub fn default_eviction_batch(capacity: usize) -> usize {
        (capacity / 10).max(1)
    }

    /// Cached reply for `query`, if any.
    pub fn lookup(&self, query: &str) -> Option<&str> {
        let key = normalize_key(query);
        if key.is_empty() {
            return None;
        }
        self.entries.get(&key).map(String::as_str)
    }

    /// Remember `response` for `query`.
    ///
    /// First write wins: an existing entry is never overwritten. Queries
    /// that normalize to an empty key are not cached. Returns `true` when a
    /// new entry was inserted.
    pub fn store(&mut self, query: &str, response: impl Into<String>) -> bool {
        let key = normalize_key(query);
        if key.is_empty() || self.entries.contains_key(&key) {
            return false;
        }

        if self.entries.len() >= self.capacity {
            let evict = self.eviction_batch.min(self.order.len());
            for old in self.order.drain(..evict) {
                self.entries.remove(&old);
            }
            tracing::debug!(evicted = evict, "Response cache full, evicted oldest entries");
        }

        self.order.push_back(key.clone());
        self.entries.insert(key, response.into());
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn eviction_batch(&self) -> usize {
        self.eviction_batch
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn punctuation_and_case_collide() {
        assert_eq!(normalize_key("Hello, World!"), "HELLOWORLD");
        assert_eq!(normalize_key("HELLO WORLD"), "HELLOWORLD");
        assert_eq!(normalize_key("what's_up?"), "WHATS_UP");
    }

    #[test]
    fn non_ascii_letters_survive() {
        assert_eq!(normalize_key("straße?"), "STRASSE");
        assert_eq!(normalize_key("日本語"), "日本語");
    }

    #[test]
    fn lookup_after_store() {
        let mut cache = ResponseCache::default();
        assert!(cache.store("Hello, World!", "hi there"));
        assert_eq!(cache.lookup("hello world"), Some("hi there"));
        assert_eq!(cache.lookup("goodbye"), None);
    }

    #[test]
    fn first_write_wins() {
        let mut cache = ResponseCache::default();
        assert!(cache.store("ping", "pong"));
        assert!(!cache.store("PING!", "something else"));
        assert_eq!(cache.lookup("ping"), Some("pong"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn empty_keys_are_not_cached() {
        let mut cache = ResponseCache::default();
        assert!(!cache.store("?!", "reply"));
        assert!(cache.lookup("...").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn never_exceeds_capacity() {
        let mut cache = ResponseCache::new(1000, 100);
        for i in 0..5000 {
            cache.store(&format!("query {i}"), "r");
            assert!(cache.len() <= 1000);
        }
    }

    #[test]
    fn evicts_oldest_batch() {
        let mut cache = ResponseCache::new(10, 3);
        for i in 0..10 {
            cache.store(&format!("q{i}"), format!("r{i}"));
        }
        assert_eq!(cache.len(), 10);

        cache.store("q10", "r10");
        assert_eq!(cache.len(), 8);
        for i in 0..3 {
            assert!(cache.lookup(&format!("q{i}")).is_none());
        }
        assert_eq!(cache.lookup("q3"), Some("r3"));
        assert_eq!(cache.lookup("q10"), Some("r10"));
    }

    #[test]
    fn small_cache_evicts_a_tenth() {
        let mut cache = ResponseCache::with_capacity(50);
        assert_eq!(cache.eviction_batch(), 5);
        for i in 0..51 {
            cache.store(&format!("query {i}"), "r");
        }
        assert_eq!(cache.len(), 46);
        assert!(cache.lookup("query 4").is_none());
        assert_eq!(cache.lookup("query 5"), Some("r"));
        assert_eq!(cache.lookup("query 50"), Some("r"));
    }

    #[test]
    fn batch_is_bounded_by_capacity() {
        assert_eq!(ResponseCache::with_capacity(5).eviction_batch(), 1);
        assert_eq!(ResponseCache::new(50, 100).eviction_batch(), 50);
        assert_eq!(ResponseCache::new(50, 0).eviction_batch(), 1);
        assert_eq!(ResponseCache::default().eviction_batch(), 100);
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = ResponseCache::new(2, 1);
        cache.store("a", "1");
        cache.store("b", "2");
        cache.clear();
        assert!(cache.is_empty());
        // Order queue was cleared too, so refilling works normally.
        cache.store("c", "3");
        cache.store("d", "4");
        cache.store("e", "5");
        assert_eq!(cache.len(), 2);
        assert!(cache.lookup("c").is_none());
    }
}
