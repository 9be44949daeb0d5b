//! Bybit v5 kline stream adapter.

use serde_json::{json, Value};
use types::{NormalizedEvent, OhlcvPayload};

use super::{json_num, json_ts, kline_event, parse_err, ExchangeAdapter};
use crate::error::Result;

pub struct BybitAdapter;

impl ExchangeAdapter for BybitAdapter {
    fn venue(&self) -> &'static str {
        "bybit"
    }

    fn ws_url(&self) -> &'static str {
        "wss://stream.bybit.com/v5/public/linear"
    }

    fn subscribe(&self, symbol: &str, tf: &str) -> Value {
        json!({"op": "subscribe", "args": [format!("kline.{tf}.{symbol}")]})
    }

    fn parse(&self, msg: &Value) -> Result<Option<NormalizedEvent>> {
        let Some(data) = msg.get("data").and_then(Value::as_array) else {
            return Ok(None);
        };
        let Some(bar) = data.first().filter(|b| b.is_object()) else {
            return Ok(None);
        };
        // symbol rides on the topic (`kline.{tf}.{symbol}`) when the bar
        // itself does not carry one
        let symbol = bar
            .get("symbol")
            .and_then(Value::as_str)
            .or_else(|| {
                msg.get("topic")
                    .and_then(Value::as_str)
                    .and_then(|t| t.rsplit('.').next())
            })
            .ok_or_else(|| parse_err("bybit", "missing symbol"))?;
        let candle = OhlcvPayload {
            o: json_num(&bar["open"]).ok_or_else(|| parse_err("bybit", "bad open"))?,
            h: json_num(&bar["high"]).ok_or_else(|| parse_err("bybit", "bad high"))?,
            l: json_num(&bar["low"]).ok_or_else(|| parse_err("bybit", "bad low"))?,
            c: json_num(&bar["close"]).ok_or_else(|| parse_err("bybit", "bad close"))?,
            v: json_num(&bar["volume"]).ok_or_else(|| parse_err("bybit", "bad volume"))?,
        };
        let ts = json_ts(&bar["start"]).ok_or_else(|| parse_err("bybit", "missing start"))?;
        let tf = bar
            .get("interval")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Some(kline_event("bybit", symbol, tf, ts, candle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kline_frame() {
        let frame = json!({
            "topic": "kline.1m.BTCUSDT",
            "data": [{
                "start": 1_700_000_000_000i64, "interval": "1m",
                "open": "42000", "high": "42100", "low": "41900",
                "close": "42050", "volume": "7.25", "symbol": "BTCUSDT"
            }]
        });
        let ev = BybitAdapter.parse(&frame).unwrap().unwrap();
        assert_eq!(ev.symbol, "BTCUSDT");
        assert_eq!(ev.ohlcv_payload().unwrap().l, 41900.0);
    }

    #[test]
    fn symbol_falls_back_to_topic() {
        let frame = json!({
            "topic": "kline.1m.ETHUSDT",
            "data": [{
                "start": 1_700_000_000_000i64, "interval": "1m",
                "open": 1.0, "high": 2.0, "low": 0.5, "close": 1.5, "volume": 3.0
            }]
        });
        let ev = BybitAdapter.parse(&frame).unwrap().unwrap();
        assert_eq!(ev.symbol, "ETHUSDT");
    }

    #[test]
    fn subscription_ack_is_skipped() {
        let ack = json!({"op": "subscribe", "success": true});
        assert!(BybitAdapter.parse(&ack).unwrap().is_none());
    }
}
