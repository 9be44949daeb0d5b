//! OKX v5 candle channel adapter.

use serde_json::{json, Value};
use types::{NormalizedEvent, OhlcvPayload};

use super::{json_num, json_ts, kline_event, parse_err, ExchangeAdapter};
use crate::error::Result;

pub struct OkxAdapter;

impl ExchangeAdapter for OkxAdapter {
    fn venue(&self) -> &'static str {
        "okx"
    }

    fn ws_url(&self) -> &'static str {
        "wss://ws.okx.com:8443/ws/v5/public"
    }

    fn subscribe(&self, symbol: &str, tf: &str) -> Value {
        json!({"op": "subscribe", "args": [{"channel": format!("candle{tf}"), "instId": symbol}]})
    }

    fn parse(&self, msg: &Value) -> Result<Option<NormalizedEvent>> {
        let Some(rows) = msg.get("data").and_then(Value::as_array) else {
            return Ok(None);
        };
        let Some(row) = rows.first().and_then(Value::as_array) else {
            return Ok(None);
        };
        if row.len() < 6 {
            return Err(parse_err("okx", format!("candle row too short: {}", row.len())));
        }
        let arg = msg.get("arg").cloned().unwrap_or(Value::Null);
        let symbol = arg
            .get("instId")
            .and_then(Value::as_str)
            .ok_or_else(|| parse_err("okx", "missing instId"))?;
        let tf = arg
            .get("channel")
            .and_then(Value::as_str)
            .and_then(|c| c.strip_prefix("candle"))
            .map(str::to_string);
        // row layout: [ts, open, high, low, close, volume]
        let candle = OhlcvPayload {
            o: json_num(&row[1]).ok_or_else(|| parse_err("okx", "bad open"))?,
            h: json_num(&row[2]).ok_or_else(|| parse_err("okx", "bad high"))?,
            l: json_num(&row[3]).ok_or_else(|| parse_err("okx", "bad low"))?,
            c: json_num(&row[4]).ok_or_else(|| parse_err("okx", "bad close"))?,
            v: json_num(&row[5]).ok_or_else(|| parse_err("okx", "bad volume"))?,
        };
        let ts = json_ts(&row[0]).ok_or_else(|| parse_err("okx", "bad timestamp"))?;
        Ok(Some(kline_event("okx", symbol, tf, ts, candle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candle_row() {
        let frame = json!({
            "arg": {"channel": "candle1m", "instId": "BTC-USDT"},
            "data": [["1700000000000", "42000", "42100", "41900", "42050", "3.5"]]
        });
        let ev = OkxAdapter.parse(&frame).unwrap().unwrap();
        assert_eq!(ev.symbol, "BTC-USDT");
        assert_eq!(ev.tf.as_deref(), Some("1m"));
        let candle = ev.ohlcv_payload().unwrap();
        // okx order: open at index 1, high at 2
        assert_eq!(candle.o, 42000.0);
        assert_eq!(candle.h, 42100.0);
    }
}
