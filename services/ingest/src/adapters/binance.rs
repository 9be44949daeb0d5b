//! Binance kline stream adapter.

use serde_json::{json, Value};
use types::{NormalizedEvent, OhlcvPayload};

use super::{json_num, json_ts, kline_event, parse_err, ExchangeAdapter};
use crate::error::Result;

pub struct BinanceAdapter;

impl ExchangeAdapter for BinanceAdapter {
    fn venue(&self) -> &'static str {
        "binance"
    }

    fn ws_url(&self) -> &'static str {
        "wss://stream.binance.com:9443/ws"
    }

    fn subscribe(&self, symbol: &str, tf: &str) -> Value {
        json!({
            "method": "SUBSCRIBE",
            "params": [format!("{}@kline_{}", symbol.to_lowercase(), tf)],
            "id": 1
        })
    }

    fn parse(&self, msg: &Value) -> Result<Option<NormalizedEvent>> {
        // kline frames carry the candle in the `k` object
        let Some(k) = msg.get("k").filter(|k| k.is_object()) else {
            return Ok(None);
        };
        let symbol = msg
            .get("s")
            .and_then(Value::as_str)
            .ok_or_else(|| parse_err("binance", "missing symbol field"))?;
        let candle = OhlcvPayload {
            o: json_num(&k["o"]).ok_or_else(|| parse_err("binance", "bad open"))?,
            h: json_num(&k["h"]).ok_or_else(|| parse_err("binance", "bad high"))?,
            l: json_num(&k["l"]).ok_or_else(|| parse_err("binance", "bad low"))?,
            c: json_num(&k["c"]).ok_or_else(|| parse_err("binance", "bad close"))?,
            v: json_num(&k["v"]).ok_or_else(|| parse_err("binance", "bad volume"))?,
        };
        let ts = json_ts(&k["t"]).ok_or_else(|| parse_err("binance", "missing kline open time"))?;
        let tf = k.get("i").and_then(Value::as_str).map(str::to_string);
        Ok(Some(kline_event("binance", symbol, tf, ts, candle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kline_frame() {
        let frame = json!({
            "e": "kline", "E": 1_700_000_000_100i64, "s": "BTCUSDT",
            "k": {
                "t": 1_700_000_000_000i64, "T": 1_700_000_059_999i64,
                "s": "BTCUSDT", "i": "1m",
                "o": "42000.1", "c": "42010.5", "h": "42020.0", "l": "41990.0",
                "v": "12.5"
            }
        });
        let ev = BinanceAdapter.parse(&frame).unwrap().unwrap();
        assert_eq!(ev.symbol, "BTCUSDT");
        assert_eq!(ev.tf.as_deref(), Some("1m"));
        assert_eq!(ev.ts_event, 1_700_000_000_000);
        let candle = ev.ohlcv_payload().unwrap();
        assert_eq!(candle.o, 42000.1);
        assert_eq!(candle.h, 42020.0);
    }

    #[test]
    fn subscription_ack_is_not_a_data_frame() {
        let ack = json!({"result": null, "id": 1});
        assert!(BinanceAdapter.parse(&ack).unwrap().is_none());
    }

    #[test]
    fn malformed_kline_is_a_parse_error() {
        let frame = json!({"s": "BTCUSDT", "k": {"o": "not-a-number"}});
        assert!(BinanceAdapter.parse(&frame).is_err());
    }
}
