//! Session store: one [`Session`] per opaque session identifier.
//!
//! Each session sits behind its own async mutex so that a whole chat turn
//! (history reads, tool calls, cache writes) runs without interleaving
//! with another turn of the same session. The map itself is guarded by a
//! short-lived std mutex that is never held across an await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::cache::ResponseCache;
use crate::history::History;

/// Per-session conversational state.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    /// Loaded context document. Empty means "no context".
    pub context: String,
    pub history: History,
    pub cache: ResponseCache,
}

impl Session {
    pub fn new(id: impl Into<String>, cache: ResponseCache) -> Self {
        Self {
            id: id.into(),
            context: String::new(),
            history: History::new(),
            cache,
        }
    }

    pub fn has_context(&self) -> bool {
        !self.context.is_empty()
    }

    /// Install a context document. History becomes just the system
    /// message and the cache is emptied.
    pub fn load_context(&mut self, text: impl Into<String>) {
        self.context = text.into();
        self.history = History::with_system(self.context.clone());
        self.cache.clear();
    }

    /// Forget context, history, and cached replies.
    pub fn reset(&mut self) {
        self.context.clear();
        self.history.clear();
        self.cache.clear();
    }
}

pub type SessionHandle = Arc<tokio::sync::Mutex<Session>>;

/// Keyed access to sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Return the session for `session_id`, creating an empty one on first
    /// use. Concurrent first calls for the same id yield the same session.
    fn get_or_create(&self, session_id: &str) -> SessionHandle;

    /// Clear context, history, and cache of a session. Waits for any turn
    /// in flight on that session to finish first.
    async fn reset(&self, session_id: &str);

    /// Drop sessions untouched for longer than `max_idle` and return their
    /// ids. Sessions currently borrowed by a caller are skipped.
    fn evict_idle(&self, max_idle: Duration) -> Vec<String>;

    /// Whether a session with this id currently exists.
    fn contains(&self, session_id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Entry {
    handle: SessionHandle,
    last_access: Instant,
}

/// Process-local session store.
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Entry>>,
    cache_capacity: usize,
    cache_eviction_batch: usize,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        let capacity = ResponseCache::DEFAULT_CAPACITY;
        Self::with_cache_limits(capacity, ResponseCache::default_eviction_batch(capacity))
    }

    /// Sessions created by this store get caches with these limits.
    pub fn with_cache_limits(capacity: usize, eviction_batch: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            cache_capacity: capacity,
            cache_eviction_batch: eviction_batch,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the map lock cannot leave an entry half
        // written, so a poisoned map is still usable.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn get_or_create(&self, session_id: &str) -> SessionHandle {
        let mut sessions = self.lock();
        let now = Instant::now();
        let entry = sessions.entry(session_id.to_string()).or_insert_with(|| {
            tracing::debug!(session_id, "Creating session");
            Entry {
                handle: Arc::new(tokio::sync::Mutex::new(Session::new(
                    session_id,
                    ResponseCache::new(self.cache_capacity, self.cache_eviction_batch),
                ))),
                last_access: now,
            }
        });
        entry.last_access = now;
        Arc::clone(&entry.handle)
    }

    async fn reset(&self, session_id: &str) {
        let handle = self.get_or_create(session_id);
        handle.lock().await.reset();
        tracing::debug!(session_id, "Session reset");
    }

    fn evict_idle(&self, max_idle: Duration) -> Vec<String> {
        let mut sessions = self.lock();
        let now = Instant::now();
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, e)| {
                now.duration_since(e.last_access) > max_idle && Arc::strong_count(&e.handle) == 1
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(evicted = expired.len(), remaining = sessions.len(), "Evicted idle sessions");
        }
        expired
    }

    fn contains(&self, session_id: &str) -> bool {
        self.lock().contains_key(session_id)
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}
