//! Normalized market data events (ingest schema v2).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::correlation_id;
use crate::time::lag_ms;

/// Current ingest schema version.
pub const SCHEMA_VERSION: u32 = 2;

/// Timeframe labels accepted on the wire.
pub const ALLOWED_TIMEFRAMES: &[&str] = &[
    "1m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "1w", "1mo",
];

/// Kind of market data carried by a [`NormalizedEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Ohlcv,
    Tick,
    Funding,
    Oi,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EventType::Ohlcv => "ohlcv",
            EventType::Tick => "tick",
            EventType::Funding => "funding",
            EventType::Oi => "oi",
        };
        f.write_str(s)
    }
}

/// OHLCV candle payload. All fields are non-negative and ordered
/// `low <= min(open, close) <= max(open, close) <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvPayload {
    pub o: f64,
    pub h: f64,
    pub l: f64,
    pub c: f64,
    pub v: f64,
}

impl OhlcvPayload {
    /// Check the ordering and non-negativity invariants.
    pub fn is_consistent(&self) -> bool {
        let vals = [self.o, self.h, self.l, self.c, self.v];
        if vals.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return false;
        }
        let body_low = self.o.min(self.c);
        let body_high = self.o.max(self.c);
        self.l <= body_low && body_high <= self.h
    }
}

/// A venue-agnostic market data record, schema v2.
///
/// Produced by the venue adapters, owned by the WebSocket consumer until
/// handed to the ingestion manager, and immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Schema version, currently 2.
    pub v: u32,
    /// Short venue identifier, e.g. `binance`.
    pub source: String,
    pub event_type: EventType,
    pub symbol: String,
    /// Timeframe label for kline events; `None` otherwise.
    pub tf: Option<String>,
    /// Event time from the venue, ms since epoch.
    pub ts_event: i64,
    /// Wall clock at ingress, ms since epoch.
    pub ingest_ts: i64,
    /// 64-hex SHA-256 over `symbol|event_type|ts_event`.
    pub correlation_id: String,
    /// Event-specific body; OHLCV events carry an [`OhlcvPayload`] shape.
    pub payload: Value,
}

impl NormalizedEvent {
    /// Build an event, deriving the correlation id from its identity
    /// fields.
    pub fn new(
        source: impl Into<String>,
        event_type: EventType,
        symbol: impl Into<String>,
        tf: Option<String>,
        ts_event: i64,
        ingest_ts: i64,
        payload: Value,
    ) -> Self {
        let symbol = symbol.into();
        let correlation_id = correlation_id(&symbol, event_type, ts_event);
        Self {
            v: SCHEMA_VERSION,
            source: source.into(),
            event_type,
            symbol,
            tf,
            ts_event,
            ingest_ts,
            correlation_id,
            payload,
        }
    }

    /// Convenience constructor for kline events.
    #[allow(clippy::too_many_arguments)]
    pub fn ohlcv(
        source: impl Into<String>,
        symbol: impl Into<String>,
        tf: impl Into<String>,
        ts_event: i64,
        ingest_ts: i64,
        candle: OhlcvPayload,
    ) -> Self {
        Self::new(
            source,
            EventType::Ohlcv,
            symbol,
            Some(tf.into()),
            ts_event,
            ingest_ts,
            serde_json::to_value(candle).expect("ohlcv payload serializes"),
        )
    }

    /// OHLCV body, if this is a kline event with a well-formed payload.
    pub fn ohlcv_payload(&self) -> Option<OhlcvPayload> {
        if self.event_type != EventType::Ohlcv {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }

    /// Ingest lag in ms, clamped at zero for slight clock skew.
    pub fn lag_ms(&self) -> i64 {
        lag_ms(self.ts_event, self.ingest_ts)
    }
}
