//! Bitget candle channel adapter (okx-style frame shape).

use serde_json::{json, Value};
use types::{NormalizedEvent, OhlcvPayload};

use super::{json_num, json_ts, kline_event, parse_err, ExchangeAdapter};
use crate::error::Result;

pub struct BitgetAdapter;

impl ExchangeAdapter for BitgetAdapter {
    fn venue(&self) -> &'static str {
        "bitget"
    }

    fn ws_url(&self) -> &'static str {
        "wss://ws.bitget.com/spot/v1/stream"
    }

    fn subscribe(&self, symbol: &str, tf: &str) -> Value {
        json!({"op": "subscribe", "args": [format!("candle{tf}:{symbol}")]})
    }

    fn parse(&self, msg: &Value) -> Result<Option<NormalizedEvent>> {
        let Some(rows) = msg.get("data").and_then(Value::as_array) else {
            return Ok(None);
        };
        let Some(row) = rows.first().and_then(Value::as_array) else {
            return Ok(None);
        };
        if row.len() < 6 {
            return Err(parse_err(
                "bitget",
                format!("candle row too short: {}", row.len()),
            ));
        }
        let arg = msg.get("arg").cloned().unwrap_or(Value::Null);
        let symbol = arg
            .get("instId")
            .and_then(Value::as_str)
            .ok_or_else(|| parse_err("bitget", "missing instId"))?;
        let tf = arg
            .get("channel")
            .and_then(Value::as_str)
            .and_then(|c| c.strip_prefix("candle"))
            .map(str::to_string);
        // row layout: [ts, open, high, low, close, volume]
        let candle = OhlcvPayload {
            o: json_num(&row[1]).ok_or_else(|| parse_err("bitget", "bad open"))?,
            h: json_num(&row[2]).ok_or_else(|| parse_err("bitget", "bad high"))?,
            l: json_num(&row[3]).ok_or_else(|| parse_err("bitget", "bad low"))?,
            c: json_num(&row[4]).ok_or_else(|| parse_err("bitget", "bad close"))?,
            v: json_num(&row[5]).ok_or_else(|| parse_err("bitget", "bad volume"))?,
        };
        let ts = json_ts(&row[0]).ok_or_else(|| parse_err("bitget", "bad timestamp"))?;
        Ok(Some(kline_event("bitget", symbol, tf, ts, candle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candle_row() {
        let frame = json!({
            "arg": {"channel": "candle1m", "instId": "BTCUSDT"},
            "data": [["1700000000000", "1.0", "2.0", "0.5", "1.5", "10"]]
        });
        let ev = BitgetAdapter.parse(&frame).unwrap().unwrap();
        assert_eq!(ev.source, "bitget");
        assert_eq!(ev.ohlcv_payload().unwrap().v, 10.0);
    }
}
