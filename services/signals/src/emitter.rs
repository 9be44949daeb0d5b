//! Signal assembly and publishing.
//!
//! SL/TP come from the ATR policy: `risk = (ATR when finite, else
//! 1% of close) · atr_multiple`; LONG stops below and takes profit at
//! `rr_ratio` times the risk distance above (SHORT symmetric, NEUTRAL
//! collapses both to the close). Publishing prefers the broker keyed by
//! `signal_id` and falls back to an append-only JSONL file.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use broker::{Headers, Publisher};
use config::SignalsConfig;
use metrics::counter;
use schema::SchemaRegistry;
use types::{from_iso_to_ms, signal_id, to_iso_utc, FeatureRow, Side, Signal};

use crate::error::{Result, SignalError};

/// Where a signal landed and whether the write succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub sink: Sink,
    pub ok: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Broker,
    File,
}

impl Sink {
    fn label(&self) -> &'static str {
        match self {
            Sink::Broker => "broker",
            Sink::File => "file",
        }
    }
}

pub struct SignalEmitter {
    publisher: Arc<dyn Publisher>,
    cfg: SignalsConfig,
    registry: SchemaRegistry,
    version: String,
}

impl SignalEmitter {
    pub fn new(publisher: Arc<dyn Publisher>, cfg: SignalsConfig) -> Self {
        Self {
            publisher,
            cfg,
            registry: SchemaRegistry::with_builtin(),
            version: "2.0.0".to_string(),
        }
    }

    /// Compute (sl, tp) for a side given close and an optional ATR.
    fn calc_sltp(&self, side: Side, close: f64, atr: Option<f64>) -> Result<(f64, f64)> {
        if !close.is_finite() {
            return Err(SignalError::NonFiniteClose);
        }
        let base = match atr {
            Some(v) if v.is_finite() => v,
            _ => 0.01 * close,
        };
        let risk = base * self.cfg.sltp.atr_multiple;
        let (sl, tp) = match side {
            Side::Long => (close - risk, close + self.cfg.sltp.rr_ratio * risk),
            Side::Short => (close + risk, close - self.cfg.sltp.rr_ratio * risk),
            Side::Neutral => (close, close),
        };
        Ok((sl, tp))
    }

    /// Assemble a v2 signal payload from a feature row; does not publish.
    pub fn assemble(
        &self,
        row: &FeatureRow,
        prob_tp: f64,
        side: Side,
        model_version: &str,
        rationale: Option<serde_json::Value>,
        risk: Option<serde_json::Value>,
        extra: Option<serde_json::Value>,
    ) -> Result<Signal> {
        if row.ts_event <= 0 {
            return Err(SignalError::InvalidTimestamp);
        }
        let close = row
            .get("close")
            .filter(|v| v.is_finite())
            .ok_or(SignalError::NonFiniteClose)?;
        let atr = row.find_column_containing("atr");
        let (sl, tp) = self.calc_sltp(side, close, atr)?;

        let ts_event_iso = to_iso_utc(row.ts_event);
        let signal = Signal {
            schema_version: self.version.clone(),
            signal_id: signal_id(&row.symbol, &row.tf, &ts_event_iso),
            symbol: row.symbol.clone(),
            tf: row.tf.clone(),
            ts_event: ts_event_iso,
            ts_signal: to_iso_utc(chrono::Utc::now().timestamp_millis()),
            side,
            prob_tp: prob_tp.clamp(0.0, 1.0),
            entry: close,
            sl,
            tp,
            model_version: model_version.to_string(),
            rationale,
            risk,
            extra,
        };
        counter!("signals_assembled_total", "side" => side.to_string()).increment(1);
        Ok(signal)
    }

    /// Publish an assembled signal: broker first, JSONL file on failure.
    pub async fn publish(&self, signal: &Signal) -> Result<PublishOutcome> {
        let value = serde_json::to_value(signal)?;
        self.registry.validate("signal", "2", &value)?;

        let timestamp_ms = from_iso_to_ms(&signal.ts_event).unwrap_or(0);
        let broker_result = self
            .publisher
            .publish_keyed(
                &self.cfg.topic,
                signal.signal_id.as_bytes(),
                &value,
                &Headers::new(),
                timestamp_ms,
            )
            .await;

        let outcome = match broker_result {
            Ok(()) => PublishOutcome {
                sink: Sink::Broker,
                ok: true,
            },
            Err(err) => {
                tracing::warn!(error = %err, "broker publish failed, falling back to file");
                counter!("signals_fallback_file_writes_total").increment(1);
                match self.write_file(&value) {
                    Ok(()) => PublishOutcome {
                        sink: Sink::File,
                        ok: true,
                    },
                    Err(file_err) => {
                        tracing::error!(error = %file_err, "file fallback failed");
                        PublishOutcome {
                            sink: Sink::File,
                            ok: false,
                        }
                    }
                }
            }
        };

        counter!(
            "signals_published_total",
            "sink" => outcome.sink.label(),
            "result" => if outcome.ok { "ok" } else { "fail" }
        )
        .increment(1);
        Ok(outcome)
    }

    /// Append one compact JSON line to `<out_dir>/<topic>.jsonl`.
    fn write_file(&self, value: &serde_json::Value) -> Result<()> {
        let dir = PathBuf::from(&self.cfg.producer_out_dir);
        std::fs::create_dir_all(&dir).map_err(|source| SignalError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let path = dir.join(format!("{}.jsonl", self.cfg.topic));
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SignalError::Io {
                path: path.display().to_string(),
                source,
            })?;
        writeln!(file, "{value}").map_err(|source| SignalError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Assemble and publish in one step.
    #[allow(clippy::too_many_arguments)]
    pub async fn emit(
        &self,
        row: &FeatureRow,
        prob_tp: f64,
        side: Side,
        model_version: &str,
        rationale: Option<serde_json::Value>,
        risk: Option<serde_json::Value>,
        extra: Option<serde_json::Value>,
    ) -> Result<(Signal, PublishOutcome)> {
        let signal = self.assemble(row, prob_tp, side, model_version, rationale, risk, extra)?;
        let outcome = self.publish(&signal).await?;
        Ok((signal, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::MemoryBroker;
    use std::collections::BTreeMap;

    fn row_with(close: f64, atr: Option<f64>) -> FeatureRow {
        let mut values = BTreeMap::new();
        values.insert("close".to_string(), close);
        if let Some(atr) = atr {
            values.insert("atr_atr".to_string(), atr);
        }
        FeatureRow::new("BTCUSDT", "1h", 1_700_000_000_000, values, "code")
    }

    fn emitter(broker: Arc<MemoryBroker>, out_dir: &str) -> SignalEmitter {
        SignalEmitter::new(
            broker,
            SignalsConfig {
                topic: "signals.v2".to_string(),
                producer_out_dir: out_dir.to_string(),
                ..SignalsConfig::default()
            },
        )
    }

    #[tokio::test]
    async fn long_sltp_from_atr_policy() {
        let broker = Arc::new(MemoryBroker::new());
        let em = emitter(broker, "/tmp/unused");
        // close 100, atr 2, multiple 1.5, rr 2 -> risk 3, sl 97, tp 106
        let signal = em
            .assemble(&row_with(100.0, Some(2.0)), 0.8, Side::Long, "m1", None, None, None)
            .unwrap();
        assert!((signal.sl - 97.0).abs() < 1e-12);
        assert!((signal.tp - 106.0).abs() < 1e-12);
        assert_eq!(signal.entry, 100.0);
        assert_eq!(signal.signal_id.len(), 16);
        assert_eq!(
            signal.signal_id,
            signal_id("BTCUSDT", "1h", &to_iso_utc(1_700_000_000_000))
        );
    }

    #[tokio::test]
    async fn short_is_symmetric_and_neutral_collapses() {
        let broker = Arc::new(MemoryBroker::new());
        let em = emitter(broker, "/tmp/unused");
        let short = em
            .assemble(&row_with(100.0, Some(2.0)), 0.2, Side::Short, "m1", None, None, None)
            .unwrap();
        assert!((short.sl - 103.0).abs() < 1e-12);
        assert!((short.tp - 94.0).abs() < 1e-12);

        let neutral = em
            .assemble(&row_with(100.0, Some(2.0)), 0.5, Side::Neutral, "m1", None, None, None)
            .unwrap();
        assert_eq!(neutral.sl, 100.0);
        assert_eq!(neutral.tp, 100.0);
    }

    #[tokio::test]
    async fn missing_atr_falls_back_to_one_percent() {
        let broker = Arc::new(MemoryBroker::new());
        let em = emitter(broker, "/tmp/unused");
        // risk = 1% of 200 * 1.5 = 3
        let signal = em
            .assemble(&row_with(200.0, None), 0.8, Side::Long, "m1", None, None, None)
            .unwrap();
        assert!((signal.sl - 197.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn publishes_to_broker_keyed_by_signal_id() {
        let broker = Arc::new(MemoryBroker::new());
        let em = emitter(broker.clone(), "/tmp/unused");
        let (signal, outcome) = em
            .emit(&row_with(100.0, Some(2.0)), 0.8, Side::Long, "m1", None, None, None)
            .await
            .unwrap();
        assert_eq!(outcome.sink, Sink::Broker);
        assert!(outcome.ok);

        let records = broker.records("signals.v2");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, signal.signal_id.as_bytes());
        assert_eq!(records[0].timestamp_ms, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn broker_failure_falls_back_to_jsonl_file() {
        let dir = tempfile::tempdir().unwrap();
        let broker = Arc::new(MemoryBroker::new());
        broker.fail_next("signals.v2", 1);
        let em = emitter(broker.clone(), dir.path().to_str().unwrap());

        let (signal, outcome) = em
            .emit(&row_with(100.0, Some(2.0)), 0.8, Side::Long, "m1", None, None, None)
            .await
            .unwrap();
        assert_eq!(outcome.sink, Sink::File);
        assert!(outcome.ok);
        assert!(broker.is_empty("signals.v2"));

        let contents =
            std::fs::read_to_string(dir.path().join("signals.v2.jsonl")).unwrap();
        let line: serde_json::Value = serde_json::from_str(contents.lines().next().unwrap()).unwrap();
        assert_eq!(line["signal_id"], serde_json::json!(signal.signal_id));
        assert_eq!(line["side"], serde_json::json!("LONG"));
    }
}
