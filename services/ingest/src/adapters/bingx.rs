//! BingX kline stream adapter (binance-compatible frame shape).

use serde_json::{json, Value};
use types::{NormalizedEvent, OhlcvPayload};

use super::{json_num, json_ts, kline_event, parse_err, ExchangeAdapter};
use crate::error::Result;

pub struct BingxAdapter;

impl ExchangeAdapter for BingxAdapter {
    fn venue(&self) -> &'static str {
        "bingx"
    }

    fn ws_url(&self) -> &'static str {
        "wss://open-api-ws.bingx.com/market"
    }

    fn subscribe(&self, symbol: &str, tf: &str) -> Value {
        json!({
            "id": 1,
            "method": "SUBSCRIBE",
            "params": [format!("{}@kline_{}", symbol.to_lowercase(), tf)]
        })
    }

    fn parse(&self, msg: &Value) -> Result<Option<NormalizedEvent>> {
        let Some(k) = msg.get("k").filter(|k| k.is_object()) else {
            return Ok(None);
        };
        let symbol = msg
            .get("s")
            .and_then(Value::as_str)
            .ok_or_else(|| parse_err("bingx", "missing symbol field"))?;
        let candle = OhlcvPayload {
            o: json_num(&k["o"]).ok_or_else(|| parse_err("bingx", "bad open"))?,
            h: json_num(&k["h"]).ok_or_else(|| parse_err("bingx", "bad high"))?,
            l: json_num(&k["l"]).ok_or_else(|| parse_err("bingx", "bad low"))?,
            c: json_num(&k["c"]).ok_or_else(|| parse_err("bingx", "bad close"))?,
            v: json_num(&k["v"]).ok_or_else(|| parse_err("bingx", "bad volume"))?,
        };
        let ts = json_ts(&k["t"]).ok_or_else(|| parse_err("bingx", "missing kline open time"))?;
        let tf = k.get("i").and_then(Value::as_str).map(str::to_string);
        Ok(Some(kline_event("bingx", symbol, tf, ts, candle)))
    }
}
