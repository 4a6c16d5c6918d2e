//! Generic in-memory bounded cache with LRU eviction and optional TTL.
//!
//! Explicitly constructed and injected by callers; there is no ambient
//! singleton. The interior mutex exists so one instance can be shared across
//! the bounded batch workers; mutations are short and never block on I/O.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Construction parameters for one cache instance.
#[derive(Debug, Clone)]
pub struct LruConfig {
    /// Maximum number of entries; `0` retains nothing.
    pub max_entries: usize,
    /// Maximum entry age; `None` disables expiry.
    pub ttl: Option<Duration>,
}

impl Default for LruConfig {
    fn default() -> Self {
        Self {
            max_entries: 100,
            ttl: None,
        }
    }
}

/// Counters exposed for cache introspection.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped by capacity or TTL expiry.
    pub evictions: u64,
}

struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

struct State<V> {
    entries: HashMap<String, CacheEntry<V>>,
    /// Front = least recently used, back = most recently used.
    order: VecDeque<String>,
    stats: CacheStats,
}

impl<V> State<V> {
    fn touch(&mut self, key: &str) {
        self.order.retain(|k| k != key);
        self.order.push_back(key.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}

/// Insertion-ordered string-keyed cache with `max_entries` and optional TTL.
pub struct LruCache<V> {
    config: LruConfig,
    state: Mutex<State<V>>,
}

impl<V: Clone> LruCache<V> {
    pub fn new(config: LruConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State {
                entries: HashMap::new(),
                order: VecDeque::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    /// Look up a key, refreshing its recency on a hit. An expired entry is
    /// evicted and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let expired = match state.entries.get(key) {
            None => {
                state.stats.misses += 1;
                return None;
            }
            Some(entry) => match self.config.ttl {
                Some(ttl) => now.duration_since(entry.created_at) > ttl,
                None => false,
            },
        };

        if expired {
            state.remove(key);
            state.stats.evictions += 1;
            state.stats.misses += 1;
            state.stats.entries = state.entries.len();
            return None;
        }

        state.touch(key);
        state.stats.hits += 1;
        state.entries.get(key).map(|e| e.value.clone())
    }

    /// Insert or replace a value at the most-recently-used position, then
    /// evict from the least-recently-used end while over capacity.
    pub fn set(&self, key: &str, value: V) {
        self.set_at(key, value, Instant::now())
    }

    fn set_at(&self, key: &str, value: V, now: Instant) {
        if self.config.max_entries == 0 {
            return;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                created_at: now,
            },
        );
        state.touch(key);

        while state.entries.len() > self.config.max_entries {
            if let Some(oldest) = state.order.pop_front() {
                state.entries.remove(&oldest);
                state.stats.evictions += 1;
            } else {
                break;
            }
        }
        state.stats.entries = state.entries.len();
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current keys, least recently used first.
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.order.iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.entries.clear();
        state.order.clear();
        state.stats.entries = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        CacheStats {
            entries: state.entries.len(),
            ..state.stats
        }
    }
}
