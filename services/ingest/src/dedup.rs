//! Correlation-id deduplication: an LRU set with per-entry TTL.

use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
struct Entry {
    /// Unix seconds of the last add/refresh.
    stamp: u64,
    /// Recency sequence; stale queue slots are skipped during eviction.
    seq: u64,
}

/// LRU set with time-to-live, used to suppress duplicate events within the
/// TTL window.
///
/// `add` and `contains` are O(1) amortized: recency updates append a new
/// queue slot and invalidate the old one lazily, so eviction pops until it
/// finds a live slot.
pub struct DedupStore {
    capacity: usize,
    ttl_sec: u64,
    entries: HashMap<String, Entry>,
    order: VecDeque<(String, u64)>,
    next_seq: u64,
}

impl DedupStore {
    /// Defaults per the ingestion spec: 250k entries, 30 minute TTL.
    pub fn new() -> Self {
        Self::with_limits(250_000, 1800)
    }

    pub fn with_limits(capacity: usize, ttl_sec: u64) -> Self {
        assert!(capacity > 0, "dedup capacity must be positive");
        Self {
            capacity,
            ttl_sec,
            entries: HashMap::new(),
            order: VecDeque::new(),
            next_seq: 0,
        }
    }

    fn now_sec() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Add or refresh a key; evicts the least-recent entry over capacity.
    pub fn add(&mut self, key: &str) {
        self.add_at(key, Self::now_sec());
    }

    /// True when the key is present and unexpired; refreshes recency.
    pub fn contains(&mut self, key: &str) -> bool {
        self.contains_at(key, Self::now_sec())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, key: &str) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((key.to_string(), seq));
        seq
    }

    fn add_at(&mut self, key: &str, now: u64) {
        let seq = self.touch(key);
        self.entries
            .insert(key.to_string(), Entry { stamp: now, seq });
        while self.entries.len() > self.capacity {
            self.evict_oldest();
        }
    }

    fn contains_at(&mut self, key: &str, now: u64) -> bool {
        let Some(entry) = self.entries.get(key).copied() else {
            return false;
        };
        if now.saturating_sub(entry.stamp) > self.ttl_sec {
            self.entries.remove(key);
            return false;
        }
        let seq = self.touch(key);
        if let Some(e) = self.entries.get_mut(key) {
            e.stamp = now;
            e.seq = seq;
        }
        true
    }

    fn evict_oldest(&mut self) {
        while let Some((key, seq)) = self.order.pop_front() {
            match self.entries.get(&key) {
                // only live slots evict; refreshed keys left stale slots behind
                Some(entry) if entry.seq == seq => {
                    self.entries.remove(&key);
                    return;
                }
                _ => continue,
            }
        }
    }
}

impl Default for DedupStore {
    fn default() -> Self {
        Self::new()
    }
}
