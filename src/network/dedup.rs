// src/network/dedup.rs

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Remembers packet ids this node already applied or relayed.
///
/// Bounded two ways: at most `capacity` ids (least recently seen evicted first) and an id
/// older than `window` no longer counts as seen. A duplicate only has to be caught while
/// copies of it are still propagating through the mesh.
#[derive(Clone)]
pub struct DedupTracker {
    seen: Arc<Mutex<LruCache<String, Instant>>>,
    window: Duration,
}

impl DedupTracker {
    pub fn new(capacity: usize, window: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            seen: Arc::new(Mutex::new(LruCache::new(cap))),
            window,
        }
    }

    /// Atomically test and insert. `true` the first time `id` is seen within the window.
    pub fn mark_and_check(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock();
        if let Some(first_seen) = seen.get(id) {
            if now.duration_since(*first_seen) < self.window {
                return false;
            }
        }
        seen.put(id.to_string(), now);
        true
    }

    /// Non-mutating membership test (does not refresh recency).
    pub fn contains(&self, id: &str) -> bool {
        let seen = self.seen.lock();
        seen.peek(id)
            .map(|t| t.elapsed() < self.window)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.seen.lock().clear();
    }
}
