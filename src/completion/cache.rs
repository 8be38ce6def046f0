// SPDX-License-Identifier: MIT
//! Completion LRU cache.
//!
//! Memoizes completions by the exact rendered prompt so a repeated request
//! (same document state, same cursor) skips the provider round-trip.
//!
//! Key = the full rendered prompt, case- and whitespace-sensitive.
//! A key always maps to the value first stored for it; entries leave the
//! cache only through capacity-based LRU eviction.

use std::collections::{HashMap, VecDeque};

/// LRU cache mapping rendered prompt → completion text.
///
/// Thread-safety: wrap in a `Mutex` for shared use; the engine does.
pub struct CompletionCache {
    capacity: usize,
    map: HashMap<String, String>,
    /// Recency order (front = least recently used, back = most recent).
    order: VecDeque<String>,
    pub hits: u64,
    pub misses: u64,
}

impl CompletionCache {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            map: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Look up a completion. A hit bumps the entry to most-recently-used.
    pub fn get(&mut self, key: &str) -> Option<&str> {
        if self.map.contains_key(key) {
            self.order.retain(|k| k != key);
            self.order.push_back(key.to_string());
            self.hits += 1;
            self.map.get(key).map(String::as_str)
        } else {
            self.misses += 1;
            None
        }
    }

    /// Insert or overwrite an entry, evicting the least-recently-used entry
    /// when the bound is exceeded.
    pub fn put(&mut self, key: String, value: String) {
        if self.map.contains_key(&key) {
            self.order.retain(|k| k != &key);
        } else if self.map.len() >= self.capacity {
            if let Some(evict) = self.order.pop_front() {
                self.map.remove(&evict);
            }
        }
        self.order.push_back(key.clone());
        self.map.insert(key, value);
    }

    /// Hit rate 0.0–1.0; 0.0 before any lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
