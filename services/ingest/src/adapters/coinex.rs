//! CoinEx kline subscription adapter.

use serde_json::{json, Value};
use types::{NormalizedEvent, OhlcvPayload};

use super::{json_num, json_ts, kline_event, parse_err, ExchangeAdapter};
use crate::error::Result;

pub struct CoinexAdapter;

impl ExchangeAdapter for CoinexAdapter {
    fn venue(&self) -> &'static str {
        "coinex"
    }

    fn ws_url(&self) -> &'static str {
        "wss://socket.coinex.com/"
    }

    fn subscribe(&self, symbol: &str, tf: &str) -> Value {
        json!({"method": "kline.subscribe", "params": [symbol, tf], "id": 1})
    }

    fn parse(&self, msg: &Value) -> Result<Option<NormalizedEvent>> {
        if msg.get("method").and_then(Value::as_str) != Some("kline.update") {
            return Ok(None);
        }
        let params = msg
            .get("params")
            .and_then(Value::as_array)
            .ok_or_else(|| parse_err("coinex", "missing params"))?;
        let symbol = params
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| parse_err("coinex", "missing symbol"))?;
        let row = params
            .get(1)
            .and_then(Value::as_array)
            .ok_or_else(|| parse_err("coinex", "missing candle row"))?;
        if row.len() < 6 {
            return Err(parse_err(
                "coinex",
                format!("candle row too short: {}", row.len()),
            ));
        }
        // coinex row layout: [ts, open, close, high, low, volume]
        let candle = OhlcvPayload {
            o: json_num(&row[1]).ok_or_else(|| parse_err("coinex", "bad open"))?,
            c: json_num(&row[2]).ok_or_else(|| parse_err("coinex", "bad close"))?,
            h: json_num(&row[3]).ok_or_else(|| parse_err("coinex", "bad high"))?,
            l: json_num(&row[4]).ok_or_else(|| parse_err("coinex", "bad low"))?,
            v: json_num(&row[5]).ok_or_else(|| parse_err("coinex", "bad volume"))?,
        };
        let ts = json_ts(&row[0]).ok_or_else(|| parse_err("coinex", "bad timestamp"))?;
        let tf = params.get(2).and_then(Value::as_str).map(str::to_string);
        Ok(Some(kline_event("coinex", symbol, tf, ts, candle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_and_high_come_from_coinex_positions() {
        let frame = json!({
            "method": "kline.update",
            "params": ["BTCUSDT", [1_700_000_000_000i64, "100", "105", "110", "95", "12"], "1m"]
        });
        let ev = CoinexAdapter.parse(&frame).unwrap().unwrap();
        let candle = ev.ohlcv_payload().unwrap();
        // index 2 is close, index 3 is high on this venue
        assert_eq!(candle.c, 105.0);
        assert_eq!(candle.h, 110.0);
        assert_eq!(candle.l, 95.0);
        assert_eq!(ev.tf.as_deref(), Some("1m"));
    }

    #[test]
    fn non_kline_methods_are_skipped() {
        let pong = json!({"method": "server.ping", "params": []});
        assert!(CoinexAdapter.parse(&pong).unwrap().is_none());
    }
}
