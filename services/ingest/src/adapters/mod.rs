//! Per-venue protocol translation.
//!
//! Adapters are stateless: `subscribe` renders the venue-specific
//! subscription payload and `parse` maps a decoded frame into a
//! [`NormalizedEvent`]. `Ok(None)` means the frame is not a data frame
//! (subscription ack, pong, heartbeat); `Err` means a data frame failed to
//! parse and is counted upstream while the consumer keeps running.
//!
//! Field order differs per venue and is owned by each adapter's parse
//! table: coinex and kucoin candle arrays are `[ts, open, close, high,
//! low, volume]`, okx and bitget are `[ts, open, high, low, close,
//! volume]`, binance and bingx use the object form.

mod binance;
mod bingx;
mod bitget;
mod bybit;
mod coinex;
mod kucoin;
mod okx;

use std::sync::Arc;

use serde_json::Value;
use types::{EventType, NormalizedEvent, OhlcvPayload};

use crate::error::{IngestError, Result};
use crate::now_ms;

pub use binance::BinanceAdapter;
pub use bingx::BingxAdapter;
pub use bitget::BitgetAdapter;
pub use bybit::BybitAdapter;
pub use coinex::CoinexAdapter;
pub use kucoin::KucoinAdapter;
pub use okx::OkxAdapter;

/// Venue-specific protocol translation, polymorphic over the consumer.
pub trait ExchangeAdapter: Send + Sync {
    /// Short venue identifier, e.g. `binance`.
    fn venue(&self) -> &'static str;

    /// Public WebSocket endpoint.
    fn ws_url(&self) -> &'static str;

    /// Venue-specific subscription message for one (symbol, tf) stream.
    fn subscribe(&self, symbol: &str, tf: &str) -> Value;

    /// Translate a decoded frame into a normalized event.
    fn parse(&self, msg: &Value) -> Result<Option<NormalizedEvent>>;
}

/// Look up an adapter by venue name.
pub fn adapter_for(venue: &str) -> Option<Arc<dyn ExchangeAdapter>> {
    let adapter: Arc<dyn ExchangeAdapter> = match venue.to_ascii_lowercase().as_str() {
        "binance" => Arc::new(BinanceAdapter),
        "bybit" => Arc::new(BybitAdapter),
        "bingx" => Arc::new(BingxAdapter),
        "bitget" => Arc::new(BitgetAdapter),
        "coinex" => Arc::new(CoinexAdapter),
        "kucoin" => Arc::new(KucoinAdapter),
        "okx" => Arc::new(OkxAdapter),
        _ => return None,
    };
    Some(adapter)
}

/// Names of all registered venues.
pub fn registered_venues() -> &'static [&'static str] {
    &[
        "binance", "bybit", "bingx", "bitget", "coinex", "kucoin", "okx",
    ]
}

/// Numeric JSON value; venues send prices both as numbers and as strings.
pub(crate) fn json_num(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Millisecond timestamp; accepts numbers and numeric strings.
pub(crate) fn json_ts(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) fn parse_err(venue: &'static str, detail: impl Into<String>) -> IngestError {
    IngestError::Parse {
        venue: venue.to_string(),
        detail: detail.into(),
    }
}

/// Assemble a kline event stamped with the current ingest time.
pub(crate) fn kline_event(
    venue: &'static str,
    symbol: &str,
    tf: Option<String>,
    ts_event: i64,
    candle: OhlcvPayload,
) -> NormalizedEvent {
    NormalizedEvent::new(
        venue,
        EventType::Ohlcv,
        symbol,
        tf,
        ts_event,
        now_ms(),
        serde_json::to_value(candle).expect("ohlcv payload serializes"),
    )
}
