//! # Tidemark Ingestion Service
//!
//! Multi-venue market data ingestion:
//!
//! - [`adapters`] — per-venue protocol translation (subscription payloads,
//!   raw frame → [`types::NormalizedEvent`])
//! - [`consumer`] — durable WebSocket sessions with reconnect/backoff,
//!   heartbeats and optional TLS certificate pinning
//! - [`dedup`] — correlation-id LRU with TTL
//! - [`manager`] — fan-in, validation, adaptive batching and publishing
//!   with dead-letter routing
//! - [`replay`] — historical replay from archived files preserving original
//!   event timestamps
//!
//! Ordering: within a single (source, symbol, tf) path, events flow from
//! the WebSocket frame to the broker in arrival order. There is no
//! cross-source ordering guarantee.

pub mod adapters;
pub mod consumer;
pub mod dedup;
pub mod error;
pub mod manager;
pub mod metrics;
pub mod queue;
pub mod replay;
pub mod tls;

pub use adapters::{adapter_for, ExchangeAdapter};
pub use consumer::{ConsumerState, WsConsumer, WsConsumerHandle};
pub use dedup::DedupStore;
pub use error::{IngestError, Result};
pub use manager::{IngestionManager, ManagerConfig};
pub use queue::EventQueue;
pub use replay::ReplayEngine;

/// Wall clock in milliseconds since epoch.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
