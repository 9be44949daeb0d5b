//! Input bars for feature computation.

use serde::{Deserialize, Serialize};
use types::{EventType, NormalizedEvent};

/// One completed OHLCV bar keyed by (symbol, tf, ts_event).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub tf: String,
    /// Candle event time, ms since epoch (UTC).
    pub ts_event: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// Build from a normalized kline event; `None` for other event types or
    /// malformed payloads.
    pub fn from_event(event: &NormalizedEvent) -> Option<Self> {
        if event.event_type != EventType::Ohlcv {
            return None;
        }
        let candle = event.ohlcv_payload()?;
        Some(Self {
            symbol: event.symbol.clone(),
            tf: event.tf.clone().unwrap_or_default(),
            ts_event: event.ts_event,
            open: candle.o,
            high: candle.h,
            low: candle.l,
            close: candle.c,
            volume: candle.v,
        })
    }

    /// Typical price `(h + l + c) / 3`.
    pub fn hlc3(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Midpoint `(h + l) / 2`.
    pub fn hl2(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    /// Bar average `(o + h + l + c) / 4`.
    pub fn ohlc4(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }
}
