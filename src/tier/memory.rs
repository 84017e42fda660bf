//! Memory tier: bounded, in-process, LRU-evicted key→value store.
//!
//! HashMap for O(1) lookup plus a recency queue ordered oldest → newest.
//! Inserting at capacity drops the least-recently-used entry; eviction is
//! purely local and never touches the persistent tier (the entry stays
//! recoverable there).

use std::collections::{HashMap, VecDeque};

use tokio::sync::Mutex;
use tracing::debug;

use crate::compute::Embedding;
use crate::key::CacheKey;

#[derive(Debug, Default)]
struct LruState {
    entries: HashMap<CacheKey, Embedding>,
    /// Oldest at the front, most recently used at the back.
    access_order: VecDeque<CacheKey>,
}

impl LruState {
    /// Move `key` to the most-recently-used position.
    ///
    /// The `retain` scan makes every recency refresh O(len). At the
    /// configured capacities (around a thousand entries) that is a short
    /// pass over a contiguous buffer; a linked-list or epoch-counter scheme
    /// only pays off at capacities orders of magnitude larger.
    fn touch(&mut self, key: &CacheKey) {
        self.access_order.retain(|k| k != key);
        self.access_order.push_back(*key);
    }

    fn pop_lru(&mut self) -> Option<CacheKey> {
        let key = self.access_order.pop_front()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// The fast tier. All operations are non-blocking apart from the internal
/// lock, which is held only for map/queue manipulation.
pub struct MemoryTier {
    state: Mutex<LruState>,
    capacity: usize,
}

impl MemoryTier {
    /// Create a tier holding at most `capacity` entries (`capacity >= 1`,
    /// enforced by config validation).
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            capacity,
        }
    }

    /// Look up a key, refreshing its recency on hit.
    pub async fn get(&self, key: &CacheKey) -> Option<Embedding> {
        let mut state = self.state.lock().await;
        let value = state.entries.get(key).cloned()?;
        state.touch(key);
        Some(value)
    }

    /// Insert or replace an entry, evicting the LRU entry first when full.
    pub async fn put(&self, key: CacheKey, value: Embedding) {
        let mut state = self.state.lock().await;

        if !state.entries.contains_key(&key) {
            while state.entries.len() >= self.capacity {
                if let Some(evicted) = state.pop_lru() {
                    debug!(key = %evicted, "Evicted LRU entry from memory tier");
                } else {
                    break;
                }
            }
        }

        state.entries.insert(key, value);
        state.touch(&key);
    }

    /// Number of resident entries. Always ≤ capacity.
    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.entries.is_empty()
    }

    /// Residency check without touching recency.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().await.entries.contains_key(key)
    }
}
