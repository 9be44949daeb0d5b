//! # Tidemark Shared Types
//!
//! Unified type definitions used across every Tidemark service:
//!
//! - [`NormalizedEvent`] — the schema-v2 market data record all venue
//!   adapters normalize into
//! - [`Timeframe`] and UTC candle alignment math ([`time`])
//! - [`FeatureRow`] — one row of computed indicator features
//! - [`Signal`] — the v2 signal envelope published downstream
//! - Deterministic digest helpers ([`ids`]) for correlation ids, signal ids
//!   and broker partition keys
//!
//! Services depend on this crate instead of redefining wire shapes locally,
//! so the ingestion, lake and signal layers agree on exactly one schema.

pub mod event;
pub mod feature;
pub mod ids;
pub mod signal;
pub mod time;

pub use event::{EventType, NormalizedEvent, OhlcvPayload, SCHEMA_VERSION};
pub use feature::FeatureRow;
pub use ids::{correlation_id, partition_key_bytes, sha256_hex, signal_id};
pub use signal::{Side, Signal};
pub use time::{
    candle_bounds, candle_close_ms, candle_open_ms, from_iso_to_ms, is_aligned, iter_candles,
    next_candle_open_ms, parse_timeframe, tf_to_ms, to_iso_utc, Timeframe, TimeframeError,
};
