//! Bounded fan-in queue with drop-oldest overflow.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use types::NormalizedEvent;

/// Bounded event queue connecting producers (WebSocket consumers) to the
/// ingestion manager.
///
/// Overflow drops the oldest entry and counts it, so a slow consumer never
/// blocks the socket read path. `pop_timeout` bounds the wait, which is what
/// lets the manager flush partially-filled batches on idle.
pub struct EventQueue {
    capacity: usize,
    inner: Mutex<VecDeque<NormalizedEvent>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            capacity,
            inner: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue an event; returns `false` when the oldest entry was dropped
    /// to make room.
    pub fn push(&self, event: NormalizedEvent) -> bool {
        let overflowed = {
            let mut q = self.inner.lock();
            let overflowed = q.len() >= self.capacity;
            if overflowed {
                q.pop_front();
            }
            q.push_back(event);
            overflowed
        };
        if overflowed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        !overflowed
    }

    /// Dequeue the next event, waiting at most `timeout`.
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<NormalizedEvent> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(event) = self.inner.lock().pop_front() {
                return Some(event);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.inner.lock().pop_front();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Events discarded due to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
