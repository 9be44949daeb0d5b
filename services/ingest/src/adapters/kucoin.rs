//! KuCoin candles topic adapter.

use serde_json::{json, Value};
use types::{NormalizedEvent, OhlcvPayload};

use super::{json_num, json_ts, kline_event, parse_err, ExchangeAdapter};
use crate::error::Result;

pub struct KucoinAdapter;

impl ExchangeAdapter for KucoinAdapter {
    fn venue(&self) -> &'static str {
        "kucoin"
    }

    fn ws_url(&self) -> &'static str {
        "wss://ws-api-spot.kucoin.com/"
    }

    fn subscribe(&self, symbol: &str, tf: &str) -> Value {
        json!({
            "id": 1,
            "type": "subscribe",
            "topic": format!("/market/candles:{symbol}_{tf}")
        })
    }

    fn parse(&self, msg: &Value) -> Result<Option<NormalizedEvent>> {
        let Some(data) = msg.get("data") else {
            return Ok(None);
        };
        // the candle row is either `data.candles` or `data` itself
        let Some(row) = data
            .get("candles")
            .and_then(Value::as_array)
            .or_else(|| data.as_array())
        else {
            return Ok(None);
        };
        if row.len() < 6 {
            return Err(parse_err(
                "kucoin",
                format!("candle row too short: {}", row.len()),
            ));
        }
        let topic = msg.get("topic").and_then(Value::as_str).unwrap_or_default();
        let symbol = data
            .get("symbol")
            .and_then(Value::as_str)
            .or_else(|| {
                topic
                    .rsplit(':')
                    .next()
                    .and_then(|stream| stream.split('_').next())
            })
            .filter(|s| !s.is_empty())
            .ok_or_else(|| parse_err("kucoin", "missing symbol"))?;
        let tf = topic.rsplit('_').next().map(str::to_string).filter(|t| !t.is_empty());
        // kucoin row layout: [ts, open, close, high, low, volume]
        let candle = OhlcvPayload {
            o: json_num(&row[1]).ok_or_else(|| parse_err("kucoin", "bad open"))?,
            c: json_num(&row[2]).ok_or_else(|| parse_err("kucoin", "bad close"))?,
            h: json_num(&row[3]).ok_or_else(|| parse_err("kucoin", "bad high"))?,
            l: json_num(&row[4]).ok_or_else(|| parse_err("kucoin", "bad low"))?,
            v: json_num(&row[5]).ok_or_else(|| parse_err("kucoin", "bad volume"))?,
        };
        let ts = json_ts(&row[0]).ok_or_else(|| parse_err("kucoin", "bad timestamp"))?;
        Ok(Some(kline_event("kucoin", symbol, tf, ts, candle)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_candles_topic_frame() {
        let frame = json!({
            "type": "message",
            "topic": "/market/candles:BTC-USDT_1m",
            "subject": "trade.candles.update",
            "data": {
                "symbol": "BTC-USDT",
                "candles": ["1700000000000", "100", "103", "104", "99", "5.5"]
            }
        });
        let ev = KucoinAdapter.parse(&frame).unwrap().unwrap();
        assert_eq!(ev.symbol, "BTC-USDT");
        assert_eq!(ev.tf.as_deref(), Some("1m"));
        let candle = ev.ohlcv_payload().unwrap();
        // index 2 is close, index 3 is high on this venue
        assert_eq!(candle.c, 103.0);
        assert_eq!(candle.h, 104.0);
    }

    #[test]
    fn welcome_frame_is_skipped() {
        let welcome = json!({"type": "welcome", "id": "abc"});
        assert!(KucoinAdapter.parse(&welcome).unwrap().is_none());
    }
}
