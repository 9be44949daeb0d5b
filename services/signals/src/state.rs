//! Per-(symbol, tf) window state, offset tracking and feature caching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

use crate::bar::Bar;
use crate::error::{Result, SignalError};

/// Window emission semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    /// Every update returns the current window snapshot.
    Sliding,
    /// Accumulate; emit and clear once `slide` rows have arrived and the
    /// buffer is full.
    Tumbling,
}

struct SeriesState {
    window: usize,
    mode: WindowMode,
    slide: usize,
    buffer: std::collections::VecDeque<Bar>,
    count_since_emit: usize,
}

impl SeriesState {
    fn new(window: usize, mode: WindowMode, slide: usize) -> Self {
        Self {
            window,
            mode,
            slide: slide.max(1),
            buffer: std::collections::VecDeque::new(),
            count_since_emit: 0,
        }
    }

    fn update(&mut self, bar: Bar) -> Option<Vec<Bar>> {
        self.buffer.push_back(bar);
        if self.buffer.len() > self.window {
            self.buffer.pop_front();
        }
        match self.mode {
            WindowMode::Sliding => Some(self.buffer.iter().cloned().collect()),
            WindowMode::Tumbling => {
                self.count_since_emit += 1;
                if self.count_since_emit >= self.slide && self.buffer.len() >= self.window {
                    self.count_since_emit = 0;
                    let frame: Vec<Bar> = self.buffer.iter().cloned().collect();
                    self.buffer.clear();
                    Some(frame)
                } else {
                    None
                }
            }
        }
    }
}

/// Window buffers per (symbol, tf) stream.
pub struct StateManager {
    states: HashMap<(String, String), SeriesState>,
}

impl StateManager {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    pub fn configure_stream(
        &mut self,
        symbol: &str,
        tf: &str,
        window: usize,
        mode: WindowMode,
        slide: usize,
    ) {
        self.states.insert(
            (symbol.to_string(), tf.to_string()),
            SeriesState::new(window.max(1), mode, slide),
        );
    }

    pub fn is_configured(&self, symbol: &str, tf: &str) -> bool {
        self.states
            .contains_key(&(symbol.to_string(), tf.to_string()))
    }

    /// Feed one bar; returns the emitted window frame when the mode calls
    /// for it. Errors on streams never configured.
    pub fn update(&mut self, bar: Bar) -> Result<Option<Vec<Bar>>> {
        let key = (bar.symbol.clone(), bar.tf.clone());
        let state = self
            .states
            .get_mut(&key)
            .ok_or_else(|| SignalError::UnconfiguredStream(format!("{}:{}", key.0, key.1)))?;
        Ok(state.update(bar))
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Key-value capability for offsets and short-lived caches. A Redis-backed
/// implementation slots in behind the same trait.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String, ttl: Option<Duration>);
}

/// Process-local key-value store with lazy TTL expiry.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, (String, Option<Instant>)>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, key: &str) -> Option<String> {
        let expired = match self.entries.get(key) {
            Some(entry) => match entry.value().1 {
                Some(deadline) if Instant::now() > deadline => true,
                _ => return Some(entry.value().0.clone()),
            },
            None => return None,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn set(&self, key: &str, value: String, ttl: Option<Duration>) {
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), (value, deadline));
    }
}

/// Per-stream "last processed timestamp" cursor, `offset:<stream>`.
pub struct OffsetTracker {
    store: Arc<dyn KvStore>,
}

impl OffsetTracker {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub fn read(&self, stream: &str) -> Option<i64> {
        self.store
            .get(&format!("offset:{stream}"))
            .and_then(|v| v.parse().ok())
    }

    pub fn commit(&self, stream: &str, ts_ms: i64) {
        self.store
            .set(&format!("offset:{stream}"), ts_ms.to_string(), None);
    }
}

/// Read-through cache for the latest feature row per stream,
/// `features:<symbol>:<tf>`, with a short TTL plus jitter so invalidations
/// spread out.
pub struct FeatureCache {
    store: Arc<dyn KvStore>,
    ttl: Duration,
    jitter: Duration,
}

impl FeatureCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            ttl: Duration::from_secs(30),
            jitter: Duration::from_secs(5),
        }
    }

    fn key(symbol: &str, tf: &str) -> String {
        let tf = if tf.is_empty() { "NA" } else { tf };
        format!("features:{symbol}:{tf}")
    }

    pub fn get(&self, symbol: &str, tf: &str) -> Option<serde_json::Value> {
        self.store
            .get(&Self::key(symbol, tf))
            .and_then(|raw| serde_json::from_str(&raw).ok())
    }

    pub fn put(&self, symbol: &str, tf: &str, row: &serde_json::Value) {
        let jitter = rand::thread_rng().gen_range(Duration::ZERO..=self.jitter);
        self.store
            .set(&Self::key(symbol, tf), row.to_string(), Some(self.ttl + jitter));
    }
}
